// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Verified, reference-counted dependency injection for service graphs.
//!
//! A service is a unit of functionality provided by a package. It implements one or more named
//! interfaces, optionally under a qualifier, and declares named references to other interfaces
//! it needs. This crate turns a set of such services into a [`ServiceLayer`] that:
//!
//! - verifies the whole graph up front: every reference must resolve, single references must be
//!   unambiguous and no service may depend on itself, directly or transitively;
//! - constructs only the services that are actually required, dependencies first;
//! - shares each instance between all of its consumers and tears it down when the last consumer
//!   releases it;
//! - lets packages look services up at runtime, but only for interfaces they declared.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use service_graph::{
//!     CreatedService, ExternalReference, InterfaceSpec, LookupOptions, ReferenceSpec, ServiceDescriptor, ServiceLayer,
//! };
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Client {
//!     config: Arc<Config>,
//! }
//!
//! let config = ServiceDescriptor::builder("app.Config", "app")
//!     .provides("app.Config")
//!     .build(|_| {
//!         Ok(CreatedService::new(Config {
//!             url: "https://example.com".to_string(),
//!         }))
//!     });
//!
//! let client = ServiceDescriptor::builder("http.Client", "http")
//!     .provides("http.Client")
//!     .reference("config", "app.Config")
//!     .build(|context| {
//!         let config = context.service::<Config>("config")?;
//!         Ok(CreatedService::new(Client { config }))
//!     });
//!
//! let mut layer = ServiceLayer::new(
//!     [config, client],
//!     [],
//!     [ExternalReference::new("ui", ReferenceSpec::single("http.Client"))],
//! )?;
//! layer.start()?;
//!
//! let client = layer
//!     .get_service("ui", &InterfaceSpec::new("http.Client"), LookupOptions::default())?
//!     .found()
//!     .and_then(|instance| instance.downcast::<Client>())
//!     .expect("client is declared and provided");
//! assert_eq!(client.config.url, "https://example.com");
//!
//! layer.destroy()?;
//! # Ok::<(), service_graph::Error>(())
//! ```
//!
//! # Logging
//!
//! The layer emits [`tracing`] events: `info` for layer lifecycle transitions, `debug` for every
//! service constructed, referenced, released or destroyed, `warn` for registered services nobody
//! required (see [`ServiceLayerOptions::report_unused_services`]) and `error` for failed teardowns.

mod builder;
mod declarations;
mod descriptor;
mod error;
mod factory;
mod interface;
mod layer;
mod lookup;
mod options;
mod repr;
mod verify;

#[doc(inline)]
pub use builder::ServiceLayerBuilder;
#[doc(inline)]
pub use descriptor::{ServiceDescriptor, ServiceDescriptorBuilder};
#[doc(inline)]
pub use error::{BoxError, Error, InjectionError, Requester, Result};
#[doc(inline)]
pub use factory::{CreatedService, ReferenceMeta, ReferenceValue, ServiceContext, ServiceInstance};
#[doc(inline)]
pub use interface::{DependencySpec, ExternalReference, InterfaceSpec, ReferenceSpec, ServiceId};
#[doc(inline)]
pub use layer::{LayerState, ServiceLayer, ServiceLookupResult, ServicesLookupResult};
#[doc(inline)]
pub use options::{LookupOptions, ServiceLayerOptions};
#[doc(inline)]
pub use repr::ServiceState;
