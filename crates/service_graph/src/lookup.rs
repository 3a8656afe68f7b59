// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Index of services by the interfaces they provide.

use std::collections::HashMap;

use crate::InterfaceSpec;
use crate::repr::ServiceIndex;

/// One service providing an interface, together with the qualifier it provides it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Provider {
    service: ServiceIndex,
    qualifier: Option<String>,
}

impl Provider {
    pub(crate) fn service(&self) -> ServiceIndex {
        self.service
    }

    pub(crate) fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }
}

/// Result of looking up exactly one implementation.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LookupOne<'a> {
    Found(&'a Provider),
    NotFound,
    Ambiguous(Vec<&'a Provider>),
}

/// Answers "who implements interface X?".
///
/// Providers are kept in registration order so that "all implementations" lookups are stable.
#[derive(Debug, Default)]
pub(crate) struct ServiceLookup {
    interfaces: HashMap<String, Vec<Provider>>,
}

impl ServiceLookup {
    /// Indexes every provided interface. Several providers of the same interface and qualifier are
    /// accepted here; whether that is a problem depends on who asks.
    pub(crate) fn new<'a>(services: impl IntoIterator<Item = (ServiceIndex, &'a [InterfaceSpec])>) -> Self {
        let mut interfaces: HashMap<String, Vec<Provider>> = HashMap::new();

        for (service, provides) in services {
            for spec in provides {
                interfaces
                    .entry(spec.interface_name().to_string())
                    .or_default()
                    .push(Provider {
                        service,
                        qualifier: spec.qualifier().map(str::to_string),
                    });
            }
        }

        Self { interfaces }
    }

    /// Finds the single provider of `interface_name`.
    ///
    /// With a qualifier, only providers registered under that qualifier match. Without one, only
    /// unqualified providers match.
    pub(crate) fn lookup_one(&self, interface_name: &str, qualifier: Option<&str>) -> LookupOne<'_> {
        let mut candidates = self.providers(interface_name).filter(|provider| provider.qualifier() == qualifier);

        match (candidates.next(), candidates.next()) {
            (None, _) => LookupOne::NotFound,
            (Some(provider), None) => LookupOne::Found(provider),
            (Some(first), Some(second)) => {
                let mut all = vec![first, second];
                all.extend(candidates);
                LookupOne::Ambiguous(all)
            }
        }
    }

    /// Every service providing `interface_name`, regardless of qualifier, in registration order.
    ///
    /// A service that provides the interface under several qualifiers is listed once.
    pub(crate) fn lookup_all(&self, interface_name: &str) -> Vec<&Provider> {
        let mut found: Vec<&Provider> = Vec::new();
        for provider in self.providers(interface_name) {
            if !found.iter().any(|seen| seen.service == provider.service) {
                found.push(provider);
            }
        }
        found
    }

    fn providers(&self, interface_name: &str) -> impl Iterator<Item = &Provider> {
        self.interfaces.get(interface_name).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(i: usize) -> ServiceIndex {
        ServiceIndex::new(i)
    }

    fn services(lookup: &[&Provider]) -> Vec<usize> {
        lookup.iter().map(|provider| provider.service().get()).collect()
    }

    fn sample() -> ServiceLookup {
        let a = [InterfaceSpec::new("log.Logger")];
        let b = [InterfaceSpec::qualified("log.Logger", "file"), InterfaceSpec::new("log.Sink")];
        let c = [InterfaceSpec::qualified("log.Logger", "console")];
        let d = [InterfaceSpec::new("log.Sink")];

        ServiceLookup::new([(index(0), &a[..]), (index(1), &b[..]), (index(2), &c[..]), (index(3), &d[..])])
    }

    #[test]
    fn unqualified_lookup_only_considers_unqualified_providers() {
        let lookup = sample();

        match lookup.lookup_one("log.Logger", None) {
            LookupOne::Found(provider) => assert_eq!(provider.service(), index(0)),
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn qualified_lookup_selects_provider() {
        let lookup = sample();

        match lookup.lookup_one("log.Logger", Some("console")) {
            LookupOne::Found(provider) => {
                assert_eq!(provider.service(), index(2));
                assert_eq!(provider.qualifier(), Some("console"));
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn missing_interface_or_qualifier() {
        let lookup = sample();

        assert_eq!(lookup.lookup_one("log.Missing", None), LookupOne::NotFound);
        assert_eq!(lookup.lookup_one("log.Logger", Some("syslog")), LookupOne::NotFound);
    }

    #[test]
    fn ambiguity_reports_every_candidate() {
        let lookup = sample();

        match lookup.lookup_one("log.Sink", None) {
            LookupOne::Ambiguous(candidates) => assert_eq!(services(&candidates), [1, 3]),
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn duplicate_qualifier_is_ambiguous() {
        let x = [InterfaceSpec::qualified("a.I", "q")];
        let y = [InterfaceSpec::qualified("a.I", "q")];
        let lookup = ServiceLookup::new([(index(0), &x[..]), (index(1), &y[..])]);

        assert!(matches!(lookup.lookup_one("a.I", Some("q")), LookupOne::Ambiguous(c) if c.len() == 2));
    }

    #[test]
    fn lookup_all_ignores_qualifiers() {
        let lookup = sample();

        assert_eq!(services(&lookup.lookup_all("log.Logger")), [0, 1, 2]);
        assert!(lookup.lookup_all("log.Missing").is_empty());
    }

    #[test]
    fn lookup_all_lists_each_service_once() {
        let multi = [InterfaceSpec::qualified("a.I", "x"), InterfaceSpec::qualified("a.I", "y")];
        let lookup = ServiceLookup::new([(index(0), &multi[..])]);

        assert_eq!(services(&lookup.lookup_all("a.I")), [0]);
    }

    #[test]
    fn service_without_interfaces_is_never_found() {
        let none: [InterfaceSpec; 0] = [];
        let lookup = ServiceLookup::new([(index(0), &none[..])]);

        assert!(lookup.lookup_all("a.I").is_empty());
        assert_eq!(lookup.lookup_one("a.I", None), LookupOne::NotFound);
    }
}
