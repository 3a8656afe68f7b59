// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug, Formatter};

use crate::factory::FactoryFn;
use crate::{BoxError, CreatedService, DependencySpec, InterfaceSpec, ReferenceSpec, ServiceContext, ServiceId};

/// Registration of one constructible service.
///
/// A descriptor names the service, lists the interfaces it provides and the references it
/// needs, and carries the factory that builds it. Descriptors are assembled once at
/// application start and handed to the [`ServiceLayer`][crate::ServiceLayer].
///
/// # Examples
///
/// ```
/// use service_graph::{CreatedService, ServiceDescriptor};
///
/// struct Logger;
/// struct Repository;
///
/// let logger = ServiceDescriptor::builder("log.ConsoleLogger", "log")
///     .provides("log.Logger")
///     .build(|_| Ok(CreatedService::new(Logger)));
///
/// let repository = ServiceDescriptor::builder("data.Repository", "data")
///     .provides("data.Repository")
///     .reference("logger", "log.Logger")
///     .build(|ctx| {
///         let _logger = ctx.service::<Logger>("logger")?;
///         Ok(CreatedService::new(Repository))
///     });
///
/// assert_eq!(repository.dependencies().len(), 1);
/// # drop(logger);
/// ```
pub struct ServiceDescriptor {
    id: ServiceId,
    package_name: String,
    provides: Vec<InterfaceSpec>,
    dependencies: Vec<DependencySpec>,
    factory: FactoryFn,
}

impl ServiceDescriptor {
    /// Starts describing the service `id` defined by `package_name`.
    #[must_use]
    pub fn builder(id: impl Into<ServiceId>, package_name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder {
            id: id.into(),
            package_name: package_name.into(),
            provides: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// The unique id of the service.
    #[must_use]
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// The package that defines the service.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Provided interfaces, in declaration order.
    #[must_use]
    pub fn provides(&self) -> &[InterfaceSpec] {
        &self.provides
    }

    /// Declared references, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[DependencySpec] {
        &self.dependencies
    }

    pub(crate) fn create(&self, context: ServiceContext) -> Result<CreatedService, BoxError> {
        (self.factory)(context)
    }
}

impl Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("package_name", &self.package_name)
            .field("provides", &self.provides)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServiceDescriptor`], created by [`ServiceDescriptor::builder`].
///
/// Supplying the factory through [`build`][ServiceDescriptorBuilder::build] completes the
/// descriptor. Structural problems such as duplicate interfaces are reported when the service
/// graph is verified.
#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
    id: ServiceId,
    package_name: String,
    provides: Vec<InterfaceSpec>,
    dependencies: Vec<DependencySpec>,
}

impl ServiceDescriptorBuilder {
    /// Provides an unqualified interface.
    #[must_use]
    pub fn provides(self, interface_name: impl Into<String>) -> Self {
        self.provides_interface(InterfaceSpec::new(interface_name))
    }

    /// Provides an interface under `qualifier`.
    #[must_use]
    pub fn provides_qualified(self, interface_name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        self.provides_interface(InterfaceSpec::qualified(interface_name, qualifier))
    }

    /// Provides an interface described by `spec`.
    #[must_use]
    pub fn provides_interface(mut self, spec: InterfaceSpec) -> Self {
        self.provides.push(spec);
        self
    }

    /// Requires the single unqualified implementation of `interface_name`.
    #[must_use]
    pub fn reference(self, reference_name: impl Into<String>, interface_name: impl Into<String>) -> Self {
        self.dependency(DependencySpec::new(reference_name, ReferenceSpec::single(interface_name)))
    }

    /// Requires the implementation of `interface_name` registered under `qualifier`.
    #[must_use]
    pub fn qualified_reference(
        self,
        reference_name: impl Into<String>,
        interface_name: impl Into<String>,
        qualifier: impl Into<String>,
    ) -> Self {
        self.dependency(DependencySpec::new(
            reference_name,
            ReferenceSpec::qualified(interface_name, qualifier),
        ))
    }

    /// Requires every implementation of `interface_name`.
    #[must_use]
    pub fn all_references(self, reference_name: impl Into<String>, interface_name: impl Into<String>) -> Self {
        self.dependency(DependencySpec::new(reference_name, ReferenceSpec::all(interface_name)))
    }

    /// Adds a fully specified dependency.
    #[must_use]
    pub fn dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Completes the descriptor with the factory that creates the service.
    ///
    /// The factory runs at most once, after all declared references have been constructed.
    pub fn build(
        self,
        factory: impl Fn(ServiceContext) -> Result<CreatedService, BoxError> + Send + Sync + 'static,
    ) -> ServiceDescriptor {
        ServiceDescriptor {
            id: self.id,
            package_name: self.package_name,
            provides: self.provides,
            dependencies: self.dependencies,
            factory: Box::new(factory),
        }
    }
}
