// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Which interfaces a package may look up at runtime.

use std::collections::{HashMap, HashSet};

use crate::{ExternalReference, ReferenceSpec};

/// Reference shapes declared by one package for one interface.
#[derive(Debug, Default)]
struct DeclaredShapes {
    unqualified: bool,
    all: bool,
    qualifiers: HashSet<String>,
}

impl DeclaredShapes {
    fn declare(&mut self, spec: &ReferenceSpec) {
        match spec {
            ReferenceSpec::All { .. } => self.all = true,
            ReferenceSpec::Single { qualifier: None, .. } => self.unqualified = true,
            ReferenceSpec::Single {
                qualifier: Some(qualifier), ..
            } => {
                self.qualifiers.insert(qualifier.clone());
            }
        }
    }

    fn permits(&self, spec: &ReferenceSpec) -> bool {
        match spec {
            ReferenceSpec::All { .. } => self.all,
            ReferenceSpec::Single { qualifier: None, .. } => self.unqualified,
            ReferenceSpec::Single {
                qualifier: Some(qualifier), ..
            } => self.qualifiers.contains(qualifier),
        }
    }
}

/// Access-control table for dynamic lookups, keyed by package and then by interface.
///
/// A lookup is permitted only if the package declared a reference of the same shape: the same
/// qualifier (or none) for single lookups, an "all" reference for list lookups. The table never
/// influences which services get constructed.
#[derive(Debug, Default)]
pub(crate) struct DeclaredDependencies {
    packages: HashMap<String, HashMap<String, DeclaredShapes>>,
}

impl DeclaredDependencies {
    pub(crate) fn new<'a>(references: impl IntoIterator<Item = &'a ExternalReference>) -> Self {
        let mut packages: HashMap<String, HashMap<String, DeclaredShapes>> = HashMap::new();

        for reference in references {
            packages
                .entry(reference.package_name().to_string())
                .or_default()
                .entry(reference.spec().interface_name().to_string())
                .or_default()
                .declare(reference.spec());
        }

        Self { packages }
    }

    pub(crate) fn is_declared(&self, package_name: &str, spec: &ReferenceSpec) -> bool {
        self.packages
            .get(package_name)
            .and_then(|interfaces| interfaces.get(spec.interface_name()))
            .is_some_and(|shapes| shapes.permits(spec))
    }
}
