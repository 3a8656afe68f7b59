// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value types naming interfaces, services and the references between them.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};

/// Unique identity of a service, usually qualified by the name of the package that defines it
/// (e.g. `"map.MapRegistryImpl"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(String);

impl ServiceId {
    /// Creates a service id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServiceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One capability provided by a service: an interface name plus an optional qualifier that
/// tells multiple providers of the same interface apart.
///
/// # Examples
///
/// ```
/// use service_graph::InterfaceSpec;
///
/// let plain = InterfaceSpec::new("http.HttpService");
/// let qualified = InterfaceSpec::qualified("map.LayerFactory", "wms");
///
/// assert_eq!(plain.qualifier(), None);
/// assert_eq!(qualified.qualifier(), Some("wms"));
/// assert_eq!(qualified.to_string(), "map.LayerFactory (qualifier 'wms')");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceSpec {
    interface_name: String,
    qualifier: Option<String>,
}

impl InterfaceSpec {
    /// An unqualified interface.
    #[must_use]
    pub fn new(interface_name: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            qualifier: None,
        }
    }

    /// An interface disambiguated by `qualifier`.
    #[must_use]
    pub fn qualified(interface_name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            interface_name: interface_name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// The name of the interface.
    #[must_use]
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    /// The qualifier, if any.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

impl Display for InterfaceSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_interface(f, &self.interface_name, self.qualifier.as_deref())
    }
}

/// A request for the implementation(s) of an interface.
///
/// A [`Single`][ReferenceSpec::Single] reference resolves to exactly one service and fails
/// verification when zero or several candidates exist. An [`All`][ReferenceSpec::All]
/// reference resolves to every provider of the interface, which may be none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceSpec {
    /// Exactly one implementation, optionally selected by qualifier.
    Single {
        /// The requested interface.
        interface_name: String,
        /// Selects among multiple providers of the interface.
        qualifier: Option<String>,
    },
    /// Every implementation of the interface, regardless of qualifier.
    All {
        /// The requested interface.
        interface_name: String,
    },
}

impl ReferenceSpec {
    /// An unqualified single-implementation reference.
    #[must_use]
    pub fn single(interface_name: impl Into<String>) -> Self {
        Self::Single {
            interface_name: interface_name.into(),
            qualifier: None,
        }
    }

    /// A single-implementation reference selecting the provider registered under `qualifier`.
    #[must_use]
    pub fn qualified(interface_name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self::Single {
            interface_name: interface_name.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// A reference to all implementations of an interface.
    #[must_use]
    pub fn all(interface_name: impl Into<String>) -> Self {
        Self::All {
            interface_name: interface_name.into(),
        }
    }

    /// The requested interface.
    #[must_use]
    pub fn interface_name(&self) -> &str {
        match self {
            Self::Single { interface_name, .. } | Self::All { interface_name } => interface_name,
        }
    }

    /// The requested qualifier. Always `None` for [`All`][ReferenceSpec::All] references.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Self::Single { qualifier, .. } => qualifier.as_deref(),
            Self::All { .. } => None,
        }
    }

    /// Whether this reference asks for all implementations.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All { .. })
    }
}

impl From<InterfaceSpec> for ReferenceSpec {
    fn from(value: InterfaceSpec) -> Self {
        Self::Single {
            interface_name: value.interface_name,
            qualifier: value.qualifier,
        }
    }
}

impl Display for ReferenceSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single {
                interface_name,
                qualifier,
            } => write_interface(f, interface_name, qualifier.as_deref()),
            Self::All { interface_name } => write!(f, "all of {interface_name}"),
        }
    }
}

/// A reference declared by a service, injected into its factory under `reference_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    reference_name: String,
    spec: ReferenceSpec,
}

impl DependencySpec {
    /// Declares that the service receives `spec` under `reference_name`.
    #[must_use]
    pub fn new(reference_name: impl Into<String>, spec: ReferenceSpec) -> Self {
        Self {
            reference_name: reference_name.into(),
            spec,
        }
    }

    /// The local name under which the resolved service(s) are injected.
    #[must_use]
    pub fn reference_name(&self) -> &str {
        &self.reference_name
    }

    /// What is being requested.
    #[must_use]
    pub fn spec(&self) -> &ReferenceSpec {
        &self.spec
    }
}

/// A reference declared outside of the service graph, by the application root or by UI
/// code belonging to `package_name`.
///
/// External references decide which services are started and double as the declarations
/// that permit `package_name` to look the interface up at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalReference {
    package_name: String,
    spec: ReferenceSpec,
}

impl ExternalReference {
    /// Declares that `package_name` depends on `spec`.
    #[must_use]
    pub fn new(package_name: impl Into<String>, spec: ReferenceSpec) -> Self {
        Self {
            package_name: package_name.into(),
            spec,
        }
    }

    /// The declaring package.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// What is being requested.
    #[must_use]
    pub fn spec(&self) -> &ReferenceSpec {
        &self.spec
    }
}

fn write_interface(f: &mut Formatter<'_>, interface_name: &str, qualifier: Option<&str>) -> fmt::Result {
    match qualifier {
        Some(qualifier) => write!(f, "{interface_name} (qualifier '{qualifier}')"),
        None => f.write_str(interface_name),
    }
}
