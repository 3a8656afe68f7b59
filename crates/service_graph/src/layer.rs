// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use crate::declarations::DeclaredDependencies;
use crate::lookup::{LookupOne, ServiceLookup};
use crate::repr::{ServiceIndex, ServiceRepr};
use crate::verify::{ServiceDependencies, VerifiedGraph, verify_dependencies};
use crate::{
    Error, ExternalReference, InterfaceSpec, LookupOptions, ReferenceSpec, ReferenceValue, Result, ServiceContext, ServiceDescriptor,
    ServiceId, ServiceInstance, ServiceLayerBuilder, ServiceLayerOptions, ServiceState,
};

/// Lifecycle state of a [`ServiceLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerState {
    /// Verified but nothing constructed yet.
    NotStarted,
    /// Required services are constructed and lookups are served.
    Started,
    /// Every service has been released. This state is terminal.
    Destroyed,
}

impl Display for LayerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Destroyed => "destroyed",
        })
    }
}

/// Outcome of [`ServiceLayer::get_service`].
#[derive(Debug, Clone)]
#[must_use]
pub enum ServiceLookupResult {
    /// The live instance of the unique matching service.
    Found(ServiceInstance),
    /// No service provides the interface (with the requested qualifier).
    NotFound,
    /// Several services match; the ids of all candidates.
    Ambiguous(Vec<ServiceId>),
    /// The requesting package never declared a dependency on the interface.
    ///
    /// This is a programming error in the caller, who usually turns it into an error of their own.
    Undeclared,
}

impl ServiceLookupResult {
    /// The instance, if one was found.
    #[must_use]
    pub fn found(self) -> Option<ServiceInstance> {
        match self {
            Self::Found(instance) => Some(instance),
            _ => None,
        }
    }
}

/// Outcome of [`ServiceLayer::get_services`].
#[derive(Debug, Clone)]
#[must_use]
pub enum ServicesLookupResult {
    /// Live instances of every provider, in registration order. May be empty.
    Found(Vec<ServiceInstance>),
    /// The requesting package never declared an "all" dependency on the interface.
    Undeclared,
}

impl ServicesLookupResult {
    /// The instances, if the lookup was permitted.
    #[must_use]
    pub fn found(self) -> Option<Vec<ServiceInstance>> {
        match self {
            Self::Found(instances) => Some(instances),
            Self::Undeclared => None,
        }
    }
}

/// Owns a verified service graph and drives the lifecycle of its services.
///
/// The graph is verified when the layer is created: every reference must resolve, single
/// references must be unambiguous and there must be no cycles. Nothing is constructed until
/// [`start`][Self::start], which builds the services targeted by the forced and UI references
/// together with everything they depend on. Services nobody needs are never constructed.
///
/// Instances are shared: each consumer holds a reference and a service is torn down when the
/// last reference is released. [`destroy`][Self::destroy] releases everything, tearing down
/// every service before releasing its own dependencies. Dropping a layer that was not destroyed
/// destroys it.
///
/// Runtime lookups take one reference per service on the first lookup and reuse it afterwards,
/// so repeated lookups do not accumulate references.
///
/// # Examples
///
/// ```
/// use service_graph::{
///     CreatedService, ExternalReference, InterfaceSpec, LookupOptions, ReferenceSpec, ServiceDescriptor, ServiceLayer,
/// };
///
/// struct Greeter(String);
///
/// let greeter = ServiceDescriptor::builder("hello.Greeter", "hello")
///     .provides("hello.Greeter")
///     .build(|_| Ok(CreatedService::new(Greeter("hi".to_string()))));
///
/// let mut layer = ServiceLayer::new(
///     [greeter],
///     [],
///     [ExternalReference::new("app", ReferenceSpec::single("hello.Greeter"))],
/// )?;
/// layer.start()?;
///
/// let instance = layer
///     .get_service("app", &InterfaceSpec::new("hello.Greeter"), LookupOptions::default())?
///     .found()
///     .expect("declared and provided");
/// assert_eq!(instance.downcast_ref::<Greeter>().map(|g| g.0.as_str()), Some("hi"));
///
/// layer.destroy()?;
/// # Ok::<(), service_graph::Error>(())
/// ```
#[derive(Debug)]
pub struct ServiceLayer {
    services: Vec<ServiceRepr>,
    dependencies: Vec<ServiceDependencies>,
    lookup: ServiceLookup,
    declarations: DeclaredDependencies,
    index: HashMap<ServiceId, ServiceIndex>,
    required: Vec<ServiceIndex>,
    acquired: Vec<ServiceIndex>,
    options: ServiceLayerOptions,
    state: LayerState,
}

impl ServiceLayer {
    /// Verifies the graph formed by `services` and prepares the services targeted by
    /// `forced_references` and `ui_references` for construction, using default options.
    ///
    /// # Errors
    ///
    /// Returns a graph error if a reference cannot be resolved, is ambiguous, the graph contains a
    /// cycle or a descriptor is malformed.
    pub fn new(
        services: impl IntoIterator<Item = ServiceDescriptor>,
        forced_references: impl IntoIterator<Item = ExternalReference>,
        ui_references: impl IntoIterator<Item = ExternalReference>,
    ) -> Result<Self> {
        Self::builder()
            .services(services)
            .forced_references(forced_references)
            .ui_references(ui_references)
            .build()
    }

    /// Creates a builder for configuring the layer step by step.
    #[must_use]
    pub fn builder() -> ServiceLayerBuilder {
        ServiceLayerBuilder::new()
    }

    pub(crate) fn from_parts(
        services: Vec<ServiceDescriptor>,
        forced_references: Vec<ExternalReference>,
        ui_references: Vec<ExternalReference>,
        options: ServiceLayerOptions,
    ) -> Result<Self> {
        let external: Vec<ExternalReference> = forced_references.into_iter().chain(ui_references).collect();

        let VerifiedGraph {
            lookup,
            dependencies,
            external: resolved,
        } = verify_dependencies(&services, &external)?;

        let mut seen = HashSet::new();
        let required: Vec<ServiceIndex> = resolved
            .iter()
            .flat_map(ReferenceValue::iter)
            .copied()
            .filter(|index| seen.insert(*index))
            .collect();

        let index = services
            .iter()
            .enumerate()
            .map(|(index, service)| (service.id().clone(), ServiceIndex::new(index)))
            .collect();

        Ok(Self {
            services: services.into_iter().map(ServiceRepr::new).collect(),
            dependencies,
            lookup,
            declarations: DeclaredDependencies::new(&external),
            index,
            required,
            acquired: Vec::new(),
            options,
            state: LayerState::NotStarted,
        })
    }

    /// Constructs every required service and its dependencies, dependencies first.
    ///
    /// If any construction fails, the services built so far are torn down again and the layer
    /// becomes [`Destroyed`][LayerState::Destroyed].
    ///
    /// # Errors
    ///
    /// Fails if the layer was already started or destroyed, if a factory fails or if an internal
    /// invariant is violated.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state(LayerState::NotStarted, "start")?;

        tracing::info!(
            layer.services = self.services.len(),
            layer.required = self.required.len(),
            "starting service layer"
        );

        let mut lifecycle = Lifecycle {
            services: &mut self.services,
            dependencies: &self.dependencies,
        };

        for (position, &index) in self.required.iter().enumerate() {
            if let Err(error) = lifecycle.acquire(index) {
                tracing::error!(error = %error, "service layer failed to start, releasing constructed services");
                for &started in self.required[..position].iter().rev() {
                    lifecycle.release_logged(started);
                }
                self.state = LayerState::Destroyed;
                return Err(error);
            }
        }

        self.state = LayerState::Started;

        if self.options.get_report_unused_services() {
            self.report_unused_services();
        }

        tracing::info!("service layer started");
        Ok(())
    }

    /// Releases every reference held by the layer. Services are torn down when their last
    /// reference goes away, always before their own dependencies are released.
    ///
    /// Teardown failures are logged and do not stop the rest of the graph from being destroyed.
    /// Destroying an already destroyed layer does nothing.
    ///
    /// # Errors
    ///
    /// Fails only if an internal invariant is violated.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state == LayerState::Destroyed {
            tracing::debug!("service layer already destroyed");
            return Ok(());
        }

        tracing::info!(layer.state = %self.state, "destroying service layer");
        self.state = LayerState::Destroyed;

        let mut lifecycle = Lifecycle {
            services: &mut self.services,
            dependencies: &self.dependencies,
        };

        while let Some(index) = self.acquired.pop() {
            lifecycle.release(index)?;
        }

        for &index in self.required.iter().rev() {
            lifecycle.release(index)?;
        }

        tracing::info!("service layer destroyed");
        Ok(())
    }

    /// Returns the unique service providing `spec` on behalf of `package_name`, constructing it
    /// first if necessary.
    ///
    /// Unless disabled through `options`, the package must have declared a reference of the same
    /// shape (same interface and qualifier); otherwise [`Undeclared`][ServiceLookupResult::Undeclared]
    /// is returned without looking anything up.
    ///
    /// The first lookup of a service takes a reference on it, released when the layer is
    /// destroyed. Later lookups of the same service reuse that reference.
    ///
    /// # Errors
    ///
    /// Fails if the layer is not started or the service cannot be constructed. A construction
    /// failure destroys the layer.
    pub fn get_service(&mut self, package_name: &str, spec: &InterfaceSpec, options: LookupOptions) -> Result<ServiceLookupResult> {
        self.expect_state(LayerState::Started, "look up a service")?;

        let reference = ReferenceSpec::from(spec.clone());
        if !options.get_ignore_declaration_check() && !self.declarations.is_declared(package_name, &reference) {
            tracing::debug!(package.name = package_name, interface = %spec, "undeclared service lookup");
            return Ok(ServiceLookupResult::Undeclared);
        }

        let index = match self.lookup.lookup_one(spec.interface_name(), spec.qualifier()) {
            LookupOne::Found(provider) => provider.service(),
            LookupOne::NotFound => return Ok(ServiceLookupResult::NotFound),
            LookupOne::Ambiguous(candidates) => {
                return Ok(ServiceLookupResult::Ambiguous(
                    candidates
                        .iter()
                        .map(|provider| self.services[provider.service().get()].id().clone())
                        .collect(),
                ));
            }
        };

        self.acquire_for_lookup(index).map(ServiceLookupResult::Found)
    }

    /// Returns every service providing `interface_name` on behalf of `package_name`, constructing
    /// them first if necessary.
    ///
    /// The package must have declared an "all implementations" reference to the interface;
    /// otherwise [`Undeclared`][ServicesLookupResult::Undeclared] is returned.
    ///
    /// # Errors
    ///
    /// Fails if the layer is not started or a service cannot be constructed. A construction
    /// failure destroys the layer.
    pub fn get_services(&mut self, package_name: &str, interface_name: &str) -> Result<ServicesLookupResult> {
        self.expect_state(LayerState::Started, "look up services")?;

        if !self.declarations.is_declared(package_name, &ReferenceSpec::all(interface_name)) {
            tracing::debug!(package.name = package_name, interface = interface_name, "undeclared service lookup");
            return Ok(ServicesLookupResult::Undeclared);
        }

        let indices: Vec<ServiceIndex> = self
            .lookup
            .lookup_all(interface_name)
            .into_iter()
            .map(|provider| provider.service())
            .collect();

        indices
            .into_iter()
            .map(|index| self.acquire_for_lookup(index))
            .collect::<Result<Vec<_>>>()
            .map(ServicesLookupResult::Found)
    }

    /// The lifecycle state of the layer.
    #[must_use]
    pub fn state(&self) -> LayerState {
        self.state
    }

    /// The lifecycle state of the service `id`, if it is registered.
    #[must_use]
    pub fn service_state(&self, id: &str) -> Option<ServiceState> {
        self.repr(id).map(ServiceRepr::state)
    }

    /// The number of consumers currently holding the service `id`, if it is registered.
    #[must_use]
    pub fn ref_count(&self, id: &str) -> Option<usize> {
        self.repr(id).map(ServiceRepr::ref_count)
    }

    /// Ids of all registered services, in registration order.
    pub fn service_ids(&self) -> impl Iterator<Item = &ServiceId> {
        self.services.iter().map(ServiceRepr::id)
    }

    /// The options the layer was created with.
    #[must_use]
    pub fn options(&self) -> &ServiceLayerOptions {
        &self.options
    }

    fn repr(&self, id: &str) -> Option<&ServiceRepr> {
        self.index.get(id).map(|index| &self.services[index.get()])
    }

    /// The layer holds at most one lookup reference per service, taken on the first lookup.
    /// A failed construction is fatal: the layer is destroyed before the error is returned.
    fn acquire_for_lookup(&mut self, index: ServiceIndex) -> Result<ServiceInstance> {
        if self.acquired.contains(&index) {
            return self.services[index.get()].instance_or_err().cloned();
        }

        let acquired = Lifecycle {
            services: &mut self.services,
            dependencies: &self.dependencies,
        }
        .acquire(index);

        match acquired {
            Ok(instance) => {
                self.acquired.push(index);
                Ok(instance)
            }
            Err(error) => {
                tracing::error!(error = %error, "service lookup failed, destroying service layer");
                if let Err(destroy_error) = self.destroy() {
                    tracing::error!(error = %destroy_error, "failed to destroy service layer");
                }
                Err(error)
            }
        }
    }

    fn expect_state(&self, expected: LayerState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    #[cfg_attr(test, mutants::skip)] // Advisory output only.
    fn report_unused_services(&self) {
        for repr in &self.services {
            if repr.state() == ServiceState::NotConstructed {
                tracing::warn!(
                    service.id = %repr.id(),
                    package.name = repr.descriptor().package_name(),
                    "service is registered but was never required"
                );
            }
        }
    }
}

impl Drop for ServiceLayer {
    fn drop(&mut self) {
        if self.state != LayerState::Destroyed
            && let Err(error) = self.destroy()
        {
            tracing::error!(error = %error, "failed to destroy dropped service layer");
        }
    }
}

/// Recursive construction and release over the services of one layer.
struct Lifecycle<'a> {
    services: &'a mut [ServiceRepr],
    dependencies: &'a [ServiceDependencies],
}

impl<'a> Lifecycle<'a> {
    /// Returns the instance of the service, constructing it and its dependencies if needed.
    /// Each call accounts for one reference.
    fn acquire(&mut self, index: ServiceIndex) -> Result<ServiceInstance> {
        let repr = &mut self.services[index.get()];

        if repr.state() == ServiceState::Constructed {
            let ref_count = repr.add_ref()?;
            tracing::debug!(service.id = %repr.id(), service.ref_count = ref_count, "service referenced");
            return repr.instance_or_err().cloned();
        }

        repr.before_create()?;

        let mut acquired = Vec::new();
        match self.construct(index, &mut acquired) {
            Ok(instance) => Ok(instance),
            Err(error) => {
                for dependency in acquired.into_iter().rev() {
                    self.release_logged(dependency);
                }
                self.services[index.get()].abort_create();
                Err(error)
            }
        }
    }

    fn construct(&mut self, index: ServiceIndex, acquired: &mut Vec<ServiceIndex>) -> Result<ServiceInstance> {
        let dependencies: &'a [ServiceDependencies] = self.dependencies;

        let mut references = HashMap::new();
        let mut references_meta = HashMap::new();

        for dependency in dependencies[index.get()].iter() {
            let value = match dependency.target() {
                ReferenceValue::One(target) => ReferenceValue::One(self.acquire_tracked(target.service(), acquired)?),
                ReferenceValue::All(targets) => ReferenceValue::All(
                    targets
                        .iter()
                        .map(|target| self.acquire_tracked(target.service(), acquired))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };

            references.insert(dependency.reference_name().to_string(), value);
            references_meta.insert(
                dependency.reference_name().to_string(),
                dependency.target().map(|target| target.meta().clone()),
            );
        }

        let repr = &mut self.services[index.get()];
        let context = ServiceContext::new(repr.id().clone(), references, references_meta);
        let instance = repr.create(context)?;

        tracing::debug!(service.id = %repr.id(), "service constructed");
        Ok(instance)
    }

    fn acquire_tracked(&mut self, index: ServiceIndex, acquired: &mut Vec<ServiceIndex>) -> Result<ServiceInstance> {
        let instance = self.acquire(index)?;
        acquired.push(index);
        Ok(instance)
    }

    /// Drops one reference. At zero the service is torn down and then releases its own
    /// dependencies. Services that were never constructed or are already destroyed are skipped.
    fn release(&mut self, index: ServiceIndex) -> Result<()> {
        let repr = &mut self.services[index.get()];

        match repr.state() {
            ServiceState::NotConstructed | ServiceState::Destroyed => return Ok(()),
            ServiceState::Constructing => {
                return Err(Error::internal(format!(
                    "cannot release service '{}' while it is being constructed",
                    repr.id()
                )));
            }
            ServiceState::Constructed => {}
        }

        let remaining = repr.remove_ref()?;
        if remaining > 0 {
            tracing::debug!(service.id = %repr.id(), service.ref_count = remaining, "service released");
            return Ok(());
        }

        match repr.destroy() {
            Ok(()) => tracing::debug!(service.id = %repr.id(), "service destroyed"),
            Err(error) => tracing::error!(service.id = %repr.id(), error = %error, "service teardown failed"),
        }

        let dependencies: &'a [ServiceDependencies] = self.dependencies;
        for target in dependencies[index.get()].targets() {
            self.release(target)?;
        }

        Ok(())
    }

    fn release_logged(&mut self, index: ServiceIndex) {
        if let Err(error) = self.release(index) {
            tracing::error!(error = %error, "failed to release service");
        }
    }
}
