// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The factory abstraction: how a service is created and what it receives.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::{BoxError, InjectionError, ServiceId};

pub(crate) type FactoryFn = Box<dyn Fn(ServiceContext) -> Result<CreatedService, BoxError> + Send + Sync>;

pub(crate) type Teardown = Box<dyn FnOnce() -> Result<(), BoxError> + Send + Sync>;

/// A live, shared service instance.
///
/// Instances are type-erased; use [`downcast`][ServiceInstance::downcast] to recover the
/// concrete type. To share a service through a trait object, store the trait object itself
/// (e.g. `Arc<dyn Logger>`) as the instance value and downcast to that.
///
/// Cloning is cheap and yields a handle to the same instance.
#[derive(Clone)]
pub struct ServiceInstance(Arc<dyn Any + Send + Sync>);

impl ServiceInstance {
    /// Wraps `value` in a new instance.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an already shared value without another allocation.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Returns a shared handle to the instance if it is a `T`.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    /// Borrows the instance if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether both handles point to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for ServiceInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance").finish_non_exhaustive()
    }
}

/// What a factory hands back: the instance plus an optional teardown hook.
///
/// The teardown runs exactly once, when the last consumer of the service releases it.
///
/// # Examples
///
/// ```
/// use service_graph::CreatedService;
///
/// struct Connection;
///
/// let created = CreatedService::new(Connection).with_teardown(|| {
///     // close sockets, abort background work, ...
///     Ok(())
/// });
/// # drop(created);
/// ```
pub struct CreatedService {
    instance: ServiceInstance,
    teardown: Option<Teardown>,
}

impl CreatedService {
    /// A service without teardown logic.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_instance(ServiceInstance::new(value))
    }

    /// A service backed by an existing instance handle.
    #[must_use]
    pub fn from_instance(instance: ServiceInstance) -> Self {
        Self { instance, teardown: None }
    }

    /// Registers the hook that runs when the service is destroyed.
    ///
    /// Errors returned by the hook are logged by the service layer and never propagated, so one
    /// failing service cannot keep the rest of the graph alive.
    #[must_use]
    pub fn with_teardown(mut self, teardown: impl FnOnce() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub(crate) fn into_parts(self) -> (ServiceInstance, Option<Teardown>) {
        (self.instance, self.teardown)
    }
}

impl Debug for CreatedService {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedService")
            .field("instance", &self.instance)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// The value behind a reference name: one target for single references, an ordered list for
/// "all" references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceValue<T> {
    /// Resolved from a single-implementation reference.
    One(T),
    /// Resolved from an "all implementations" reference, in registration order.
    All(Vec<T>),
}

impl<T> ReferenceValue<T> {
    /// The single value, if this came from a single-implementation reference.
    #[must_use]
    pub fn as_one(&self) -> Option<&T> {
        match self {
            Self::One(value) => Some(value),
            Self::All(_) => None,
        }
    }

    /// The values, if this came from an "all implementations" reference.
    #[must_use]
    pub fn as_all(&self) -> Option<&[T]> {
        match self {
            Self::One(_) => None,
            Self::All(values) => Some(values),
        }
    }

    /// Iterates over every value regardless of shape.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        match self {
            Self::One(value) => std::slice::from_ref(value).iter(),
            Self::All(values) => values.iter(),
        }
    }

    /// Transforms every value while keeping the shape.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ReferenceValue<U> {
        match self {
            Self::One(value) => ReferenceValue::One(f(value)),
            Self::All(values) => ReferenceValue::All(values.iter().map(f).collect()),
        }
    }

    pub(crate) const fn shape(&self) -> &'static str {
        match self {
            Self::One(_) => "a single service",
            Self::All(_) => "a list of services",
        }
    }
}

/// Describes which service was injected for a reference and through which interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMeta {
    service_id: ServiceId,
    interface_name: String,
    qualifier: Option<String>,
}

impl ReferenceMeta {
    pub(crate) fn new(service_id: ServiceId, interface_name: impl Into<String>, qualifier: Option<String>) -> Self {
        Self {
            service_id,
            interface_name: interface_name.into(),
            qualifier,
        }
    }

    /// The injected service.
    #[must_use]
    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    /// The interface through which the service was injected.
    #[must_use]
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    /// The qualifier under which the injected service provides the interface.
    #[must_use]
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

/// Everything a factory receives when its service is constructed.
///
/// All declared references are already constructed when the factory runs.
#[derive(Debug)]
pub struct ServiceContext {
    service_id: ServiceId,
    references: HashMap<String, ReferenceValue<ServiceInstance>>,
    references_meta: HashMap<String, ReferenceValue<ReferenceMeta>>,
}

impl ServiceContext {
    pub(crate) fn new(
        service_id: ServiceId,
        references: HashMap<String, ReferenceValue<ServiceInstance>>,
        references_meta: HashMap<String, ReferenceValue<ReferenceMeta>>,
    ) -> Self {
        Self {
            service_id,
            references,
            references_meta,
        }
    }

    /// The service being constructed.
    #[must_use]
    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    /// The raw value injected under `reference_name`.
    #[must_use]
    pub fn reference(&self, reference_name: &str) -> Option<&ReferenceValue<ServiceInstance>> {
        self.references.get(reference_name)
    }

    /// Metadata describing what was injected under `reference_name`.
    #[must_use]
    pub fn reference_meta(&self, reference_name: &str) -> Option<&ReferenceValue<ReferenceMeta>> {
        self.references_meta.get(reference_name)
    }

    /// Names of all injected references.
    pub fn reference_names(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// The single service injected under `reference_name`, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Fails if the reference was not declared, was declared as "all implementations" or the
    /// injected instance is not a `T`.
    pub fn service<T: Any + Send + Sync>(&self, reference_name: &str) -> Result<Arc<T>, InjectionError> {
        let value = self.lookup(reference_name)?;
        let instance = value.as_one().ok_or_else(|| InjectionError::ShapeMismatch {
            service: self.service_id.clone(),
            reference: reference_name.to_string(),
            expected: "a single service",
            actual: value.shape(),
        })?;
        self.downcast(reference_name, instance)
    }

    /// Every service injected under `reference_name`, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Fails if the reference was not declared, was declared as a single-implementation reference
    /// or any injected instance is not a `T`.
    pub fn services<T: Any + Send + Sync>(&self, reference_name: &str) -> Result<Vec<Arc<T>>, InjectionError> {
        let value = self.lookup(reference_name)?;
        let instances = value.as_all().ok_or_else(|| InjectionError::ShapeMismatch {
            service: self.service_id.clone(),
            reference: reference_name.to_string(),
            expected: "a list of services",
            actual: value.shape(),
        })?;
        instances
            .iter()
            .map(|instance| self.downcast(reference_name, instance))
            .collect()
    }

    fn lookup(&self, reference_name: &str) -> Result<&ReferenceValue<ServiceInstance>, InjectionError> {
        self.references
            .get(reference_name)
            .ok_or_else(|| InjectionError::UnknownReference {
                service: self.service_id.clone(),
                reference: reference_name.to_string(),
            })
    }

    fn downcast<T: Any + Send + Sync>(&self, reference_name: &str, instance: &ServiceInstance) -> Result<Arc<T>, InjectionError> {
        instance.downcast::<T>().ok_or_else(|| InjectionError::TypeMismatch {
            service: self.service_id.clone(),
            reference: reference_name.to_string(),
            expected: type_name::<T>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock(u64);

    fn context() -> ServiceContext {
        let mut references = HashMap::new();
        references.insert("clock".to_string(), ReferenceValue::One(ServiceInstance::new(Clock(7))));
        references.insert(
            "clocks".to_string(),
            ReferenceValue::All(vec![ServiceInstance::new(Clock(1)), ServiceInstance::new(Clock(2))]),
        );

        ServiceContext::new(ServiceId::from("pkg.Consumer"), references, HashMap::new())
    }

    #[test]
    fn typed_single_reference() {
        let clock = context().service::<Clock>("clock").unwrap();
        assert_eq!(*clock, Clock(7));
    }

    #[test]
    fn typed_all_reference_keeps_order() {
        let clocks = context().services::<Clock>("clocks").unwrap();
        let values: Vec<u64> = clocks.iter().map(|clock| clock.0).collect();
        assert_eq!(values, [1, 2]);
    }

    #[test]
    fn unknown_reference_is_reported() {
        let error = context().service::<Clock>("missing").unwrap_err();
        assert!(matches!(error, InjectionError::UnknownReference { .. }));
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let error = context().services::<Clock>("clock").unwrap_err();
        assert_eq!(
            error.to_string(),
            "reference 'clock' of service 'pkg.Consumer' is a single service, not a list of services"
        );
    }

    #[test]
    fn type_mismatch_is_reported() {
        let error = context().service::<String>("clock").unwrap_err();
        assert!(matches!(error, InjectionError::TypeMismatch { .. }));
    }

    #[test]
    fn clones_share_the_instance() {
        let instance = ServiceInstance::new(Clock(3));
        let clone = instance.clone();

        assert!(instance.ptr_eq(&clone));
        assert!(!instance.ptr_eq(&ServiceInstance::new(Clock(3))));
        assert_eq!(clone.downcast_ref::<Clock>(), Some(&Clock(3)));
    }

    #[test]
    fn reference_value_iterates_any_shape() {
        let one = ReferenceValue::One(1);
        let all = ReferenceValue::All(vec![1, 2, 3]);

        assert_eq!(one.iter().count(), 1);
        assert_eq!(all.map(|v| v * 2), ReferenceValue::All(vec![2, 4, 6]));
        assert_eq!(all.as_one(), None);
        assert_eq!(one.as_all(), None);
    }
}
