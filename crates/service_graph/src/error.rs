// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::{LayerState, ServiceId};

/// Errors produced by factories and teardown hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The party that declared a reference which could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    /// A reference declared by a service in the graph.
    Service(ServiceId),
    /// An external reference declared by a package (UI code or the application root).
    Package(String),
}

impl Display for Requester {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(id) => write!(f, "service '{id}'"),
            Self::Package(name) => write!(f, "package '{name}'"),
        }
    }
}

/// Any error raised while verifying, starting or destroying a service graph.
///
/// Graph errors ([`InterfaceNotFound`][Error::InterfaceNotFound],
/// [`AmbiguousDependency`][Error::AmbiguousDependency],
/// [`DependencyCycle`][Error::DependencyCycle] and the duplicate checks) indicate a
/// misconfigured application and are reported before any service is constructed. They are
/// not transient; retrying will not help.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required interface has no implementation.
    #[error("{requester} requires interface '{interface}'{}, but no service provides it", describe_qualifier(.qualifier))]
    InterfaceNotFound {
        /// Who declared the reference.
        requester: Requester,
        /// The missing interface.
        interface: String,
        /// The requested qualifier, if any.
        qualifier: Option<String>,
    },

    /// A single-implementation reference matches more than one service.
    #[error(
        "{requester} requires a single implementation of interface '{interface}'{}, but it is provided by multiple services: {}",
        describe_qualifier(.qualifier),
        join_ids(.candidates, ", ")
    )]
    AmbiguousDependency {
        /// Who declared the reference.
        requester: Requester,
        /// The ambiguous interface.
        interface: String,
        /// The requested qualifier, if any.
        qualifier: Option<String>,
        /// Every service that matched the reference.
        candidates: Vec<ServiceId>,
    },

    /// Services depend on each other in a cycle.
    ///
    /// The path lists the services in traversal order and repeats the first service at the end.
    #[error("dependency cycle detected: {}", join_ids(.path, " -> "))]
    DependencyCycle {
        /// The services forming the cycle.
        path: Vec<ServiceId>,
    },

    /// A service declares the same provided interface twice.
    #[error("service '{service}' provides interface '{interface}'{} more than once", describe_qualifier(.qualifier))]
    DuplicateInterface {
        /// The offending service.
        service: ServiceId,
        /// The duplicated interface.
        interface: String,
        /// The duplicated qualifier, if any.
        qualifier: Option<String>,
    },

    /// Two services were registered with the same id.
    #[error("service id '{service}' is registered more than once")]
    DuplicateService {
        /// The duplicated id.
        service: ServiceId,
    },

    /// A service declares the same reference name twice.
    #[error("service '{service}' declares reference '{reference}' more than once")]
    DuplicateReference {
        /// The offending service.
        service: ServiceId,
        /// The duplicated reference name.
        reference: String,
    },

    /// A factory failed to produce its service.
    #[error("failed to create service '{service}'")]
    ServiceCreation {
        /// The service whose factory failed.
        service: ServiceId,
        /// The error returned by the factory.
        #[source]
        source: BoxError,
    },

    /// A lifecycle operation was invoked in a state that does not permit it.
    #[error("cannot {operation} while the service layer is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state of the layer at the time of the call.
        state: LayerState,
    },

    /// An invariant of the service layer itself was violated.
    ///
    /// This indicates a bug in the container, not in the application, and is never recovered from.
    #[error("internal service layer error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// A specialized `Result` for service graph operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Misuse of the injected references inside a factory.
///
/// Factories typically propagate this with `?` into their own [`BoxError`] result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InjectionError {
    /// The service never declared a reference with this name.
    #[error("service '{service}' has no reference named '{reference}'")]
    UnknownReference {
        /// The service being constructed.
        service: ServiceId,
        /// The requested reference name.
        reference: String,
    },

    /// A single service was requested from an "all" reference or the other way around.
    #[error("reference '{reference}' of service '{service}' is {actual}, not {expected}")]
    ShapeMismatch {
        /// The service being constructed.
        service: ServiceId,
        /// The requested reference name.
        reference: String,
        /// The shape the caller asked for.
        expected: &'static str,
        /// The declared shape.
        actual: &'static str,
    },

    /// The injected instance is not of the requested type.
    #[error("reference '{reference}' of service '{service}' is not a '{expected}'")]
    TypeMismatch {
        /// The service being constructed.
        service: ServiceId,
        /// The requested reference name.
        reference: String,
        /// The requested type name.
        expected: &'static str,
    },
}

#[expect(clippy::ref_option, reason = "called from thiserror format arguments which borrow fields")]
fn describe_qualifier(qualifier: &Option<String>) -> String {
    qualifier
        .as_ref()
        .map_or_else(String::new, |qualifier| format!(" with qualifier '{qualifier}'"))
}

fn join_ids(ids: &[ServiceId], separator: &str) -> String {
    ids.iter().map(ServiceId::as_str).collect::<Vec<_>>().join(separator)
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
        assert_impl_all!(InjectionError: Send, Sync);
    }

    #[test]
    fn not_found_names_requester_and_qualifier() {
        let error = Error::InterfaceNotFound {
            requester: Requester::Package("app".to_string()),
            interface: "a.Logger".to_string(),
            qualifier: Some("file".to_string()),
        };

        insta::assert_snapshot!(
            error.to_string(),
            @"package 'app' requires interface 'a.Logger' with qualifier 'file', but no service provides it"
        );
    }

    #[test]
    fn ambiguity_lists_all_candidates() {
        let error = Error::AmbiguousDependency {
            requester: Requester::Service(ServiceId::from("b.Consumer")),
            interface: "a.Logger".to_string(),
            qualifier: None,
            candidates: vec![ServiceId::from("a.FileLogger"), ServiceId::from("a.ConsoleLogger")],
        };

        insta::assert_snapshot!(
            error.to_string(),
            @"service 'b.Consumer' requires a single implementation of interface 'a.Logger', but it is provided by multiple services: a.FileLogger, a.ConsoleLogger"
        );
    }

    #[test]
    fn cycle_shows_full_path() {
        let error = Error::DependencyCycle {
            path: vec![ServiceId::from("a"), ServiceId::from("b"), ServiceId::from("a")],
        };

        insta::assert_snapshot!(error.to_string(), @"dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn invalid_state_mentions_operation() {
        let error = Error::InvalidState {
            operation: "start",
            state: LayerState::Started,
        };

        assert_eq!(error.to_string(), "cannot start while the service layer is started");
    }

    #[test]
    fn creation_error_keeps_source() {
        let error = Error::ServiceCreation {
            service: ServiceId::from("a.Db"),
            source: "connection refused".into(),
        };

        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }
}
