// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-service construction state and reference counting.

use std::fmt::{self, Debug, Display, Formatter};

use crate::factory::Teardown;
use crate::{BoxError, Error, Result, ServiceContext, ServiceDescriptor, ServiceId, ServiceInstance};

/// Position of a service in the graph. Only meaningful for the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ServiceIndex(usize);

impl ServiceIndex {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) const fn get(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    /// The service has not been demanded yet.
    NotConstructed,
    /// The factory of the service or of one of its dependencies is running.
    Constructing,
    /// The instance exists and has at least one consumer.
    Constructed,
    /// The instance was torn down. This state is terminal.
    Destroyed,
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotConstructed => "not-constructed",
            Self::Constructing => "constructing",
            Self::Constructed => "constructed",
            Self::Destroyed => "destroyed",
        })
    }
}

/// A descriptor together with its mutable lifecycle state.
///
/// Only the service layer drives these transitions; nothing here is exported.
pub(crate) struct ServiceRepr {
    descriptor: ServiceDescriptor,
    state: ServiceState,
    instance: Option<ServiceInstance>,
    teardown: Option<Teardown>,
    ref_count: usize,
}

impl ServiceRepr {
    pub(crate) fn new(descriptor: ServiceDescriptor) -> Self {
        Self {
            descriptor,
            state: ServiceState::NotConstructed,
            instance: None,
            teardown: None,
            ref_count: 0,
        }
    }

    pub(crate) fn id(&self) -> &ServiceId {
        self.descriptor.id()
    }

    pub(crate) fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub(crate) fn state(&self) -> ServiceState {
        self.state
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Marks the start of construction.
    ///
    /// Reaching a service that is already being constructed means the graph contains a cycle
    /// that verification did not catch.
    pub(crate) fn before_create(&mut self) -> Result<()> {
        match self.state {
            ServiceState::NotConstructed => {
                self.state = ServiceState::Constructing;
                Ok(())
            }
            ServiceState::Constructing => Err(Error::internal(format!(
                "cycle detected while constructing service '{}'",
                self.id()
            ))),
            state => Err(self.unexpected_state("begin construction of", state)),
        }
    }

    /// Runs the factory and stores the instance with a single reference.
    pub(crate) fn create(&mut self, context: ServiceContext) -> Result<ServiceInstance> {
        if self.state != ServiceState::Constructing {
            return Err(self.unexpected_state("create", self.state));
        }

        let created = self.descriptor.create(context).map_err(|source| Error::ServiceCreation {
            service: self.id().clone(),
            source,
        })?;

        let (instance, teardown) = created.into_parts();
        self.instance = Some(instance.clone());
        self.teardown = teardown;
        self.state = ServiceState::Constructed;
        self.ref_count = 1;
        Ok(instance)
    }

    /// Rolls back [`before_create`][Self::before_create] after a failed construction.
    pub(crate) fn abort_create(&mut self) {
        if self.state == ServiceState::Constructing {
            self.state = ServiceState::NotConstructed;
        }
    }

    pub(crate) fn add_ref(&mut self) -> Result<usize> {
        if self.state != ServiceState::Constructed {
            return Err(self.unexpected_state("add a reference to", self.state));
        }

        self.ref_count += 1;
        Ok(self.ref_count)
    }

    /// Drops one reference and returns how many remain. The instance is only torn down once
    /// this reaches zero, which is up to the caller.
    pub(crate) fn remove_ref(&mut self) -> Result<usize> {
        if self.state != ServiceState::Constructed {
            return Err(self.unexpected_state("remove a reference from", self.state));
        }

        self.ref_count = self.ref_count.saturating_sub(1);
        Ok(self.ref_count)
    }

    /// Tears the instance down. The state becomes `Destroyed` even when the teardown hook fails.
    pub(crate) fn destroy(&mut self) -> Result<(), BoxError> {
        self.state = ServiceState::Destroyed;
        self.ref_count = 0;
        self.instance = None;

        match self.teardown.take() {
            Some(teardown) => teardown(),
            None => Ok(()),
        }
    }

    pub(crate) fn instance_or_err(&self) -> Result<&ServiceInstance> {
        match (&self.instance, self.state) {
            (Some(instance), ServiceState::Constructed) => Ok(instance),
            (_, state) => Err(self.unexpected_state("access the instance of", state)),
        }
    }

    fn unexpected_state(&self, action: &str, state: ServiceState) -> Error {
        Error::internal(format!("cannot {action} service '{}' in state {state}", self.id()))
    }
}

impl Debug for ServiceRepr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRepr")
            .field("id", self.id())
            .field("state", &self.state)
            .field("ref_count", &self.ref_count)
            .finish_non_exhaustive()
    }
}
