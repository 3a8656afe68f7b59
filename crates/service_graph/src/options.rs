// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Configuration of a [`ServiceLayer`][crate::ServiceLayer].
///
/// # Examples
///
/// ```
/// use service_graph::ServiceLayerOptions;
///
/// let options = ServiceLayerOptions::new().report_unused_services(true);
/// assert!(options.get_report_unused_services());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ServiceLayerOptions {
    report_unused_services: bool,
}

impl ServiceLayerOptions {
    /// Default options: unused services are reported in debug builds only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            report_unused_services: cfg!(debug_assertions),
        }
    }

    /// Whether `start()` logs a warning for every registered service that nobody required.
    ///
    /// The report is advisory; unused services are never an error.
    #[must_use]
    pub fn report_unused_services(mut self, enabled: bool) -> Self {
        self.report_unused_services = enabled;
        self
    }

    /// Returns whether unused services are reported.
    #[must_use]
    pub fn get_report_unused_services(&self) -> bool {
        self.report_unused_services
    }
}

impl Default for ServiceLayerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call options for [`ServiceLayer::get_service`][crate::ServiceLayer::get_service].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct LookupOptions {
    ignore_declaration_check: bool,
}

impl LookupOptions {
    /// Default options: the declaration check is enforced.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the check that the requesting package declared the interface.
    ///
    /// Reserved for framework code that performs lookups on behalf of other packages.
    #[must_use]
    pub fn ignore_declaration_check(mut self, ignore: bool) -> Self {
        self.ignore_declaration_check = ignore;
        self
    }

    /// Returns whether the declaration check is skipped.
    #[must_use]
    pub fn get_ignore_declaration_check(&self) -> bool {
        self.ignore_declaration_check
    }
}
