// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::{ExternalReference, Result, ServiceDescriptor, ServiceLayer, ServiceLayerOptions};

/// Collects services, references and options for a [`ServiceLayer`].
///
/// Created with [`ServiceLayer::builder`]. Nothing is verified until [`build`][Self::build].
///
/// # Examples
///
/// ```
/// use service_graph::{CreatedService, ExternalReference, ReferenceSpec, ServiceDescriptor, ServiceLayer, ServiceLayerOptions};
///
/// let clock = ServiceDescriptor::builder("time.Clock", "time")
///     .provides("time.Clock")
///     .build(|_| Ok(CreatedService::new(std::time::Instant::now())));
///
/// let layer = ServiceLayer::builder()
///     .service(clock)
///     .forced_reference(ExternalReference::new("runtime", ReferenceSpec::single("time.Clock")))
///     .options(ServiceLayerOptions::new().report_unused_services(false))
///     .build()?;
///
/// assert_eq!(layer.service_ids().count(), 1);
/// # Ok::<(), service_graph::Error>(())
/// ```
#[derive(Debug, Default)]
#[must_use]
pub struct ServiceLayerBuilder {
    services: Vec<ServiceDescriptor>,
    forced_references: Vec<ExternalReference>,
    ui_references: Vec<ExternalReference>,
    options: ServiceLayerOptions,
}

impl ServiceLayerBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a service. Registration order is the order of "all implementations" lists.
    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    /// Registers several services.
    pub fn services(mut self, services: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        self.services.extend(services);
        self
    }

    /// Adds a reference the runtime itself needs satisfied.
    pub fn forced_reference(mut self, reference: ExternalReference) -> Self {
        self.forced_references.push(reference);
        self
    }

    /// Adds several runtime references.
    pub fn forced_references(mut self, references: impl IntoIterator<Item = ExternalReference>) -> Self {
        self.forced_references.extend(references);
        self
    }

    /// Adds a reference declared by a UI package.
    pub fn ui_reference(mut self, reference: ExternalReference) -> Self {
        self.ui_references.push(reference);
        self
    }

    /// Adds several UI references.
    pub fn ui_references(mut self, references: impl IntoIterator<Item = ExternalReference>) -> Self {
        self.ui_references.extend(references);
        self
    }

    /// Replaces the layer options.
    pub fn options(mut self, options: ServiceLayerOptions) -> Self {
        self.options = options;
        self
    }

    /// Verifies the graph and creates the layer in the [`NotStarted`][crate::LayerState::NotStarted] state.
    ///
    /// # Errors
    ///
    /// Returns a graph error if a reference cannot be resolved, is ambiguous, the graph contains a
    /// cycle or a descriptor is malformed.
    pub fn build(self) -> Result<ServiceLayer> {
        ServiceLayer::from_parts(self.services, self.forced_references, self.ui_references, self.options)
    }
}
