// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! One-time verification of a service graph.
//!
//! Verification turns the registered descriptors into a consistent, acyclic and fully resolved
//! graph before anything is constructed, or fails with a diagnostic naming the culprit.

use std::collections::HashSet;

use crate::lookup::{LookupOne, Provider, ServiceLookup};
use crate::repr::ServiceIndex;
use crate::{Error, ExternalReference, ReferenceMeta, ReferenceSpec, ReferenceValue, Requester, Result, ServiceDescriptor};

/// A reference target together with the metadata handed to the consuming factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedTarget {
    service: ServiceIndex,
    meta: ReferenceMeta,
}

impl ResolvedTarget {
    pub(crate) fn service(&self) -> ServiceIndex {
        self.service
    }

    pub(crate) fn meta(&self) -> &ReferenceMeta {
        &self.meta
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedDependency {
    reference_name: String,
    target: ReferenceValue<ResolvedTarget>,
}

impl ResolvedDependency {
    pub(crate) fn reference_name(&self) -> &str {
        &self.reference_name
    }

    pub(crate) fn target(&self) -> &ReferenceValue<ResolvedTarget> {
        &self.target
    }
}

/// The resolved references of one service, in declaration order. Empty for services without
/// dependencies.
#[derive(Debug, Clone, Default)]
pub(crate) struct ServiceDependencies(Vec<ResolvedDependency>);

impl ServiceDependencies {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.0.iter()
    }

    /// Every service this one depends on, including repeated edges.
    pub(crate) fn targets(&self) -> impl Iterator<Item = ServiceIndex> + '_ {
        self.0
            .iter()
            .flat_map(|dependency| dependency.target.iter().map(ResolvedTarget::service))
    }

    #[cfg(test)]
    pub(crate) fn get(&self, reference_name: &str) -> Option<&ReferenceValue<ResolvedTarget>> {
        self.0
            .iter()
            .find(|dependency| dependency.reference_name == reference_name)
            .map(|dependency| &dependency.target)
    }

    /// Builds single-target dependencies directly, bypassing verification.
    #[cfg(test)]
    pub(crate) fn from_single_targets(targets: impl IntoIterator<Item = (&'static str, ServiceIndex)>) -> Self {
        Self(
            targets
                .into_iter()
                .map(|(reference_name, service)| ResolvedDependency {
                    reference_name: reference_name.to_string(),
                    target: ReferenceValue::One(ResolvedTarget {
                        service,
                        meta: ReferenceMeta::new(crate::ServiceId::from(reference_name), "test.Interface", None),
                    }),
                })
                .collect(),
        )
    }
}

/// Output of a successful verification.
#[derive(Debug)]
pub(crate) struct VerifiedGraph {
    pub(crate) lookup: ServiceLookup,
    /// Resolved references per service, parallel to the descriptor list.
    pub(crate) dependencies: Vec<ServiceDependencies>,
    /// Resolution of each external reference, parallel to the reference list.
    pub(crate) external: Vec<ReferenceValue<ServiceIndex>>,
}

/// Checks the structure of every descriptor, resolves every reference and rejects cycles.
pub(crate) fn verify_dependencies(services: &[ServiceDescriptor], external: &[ExternalReference]) -> Result<VerifiedGraph> {
    check_structure(services)?;

    let lookup = ServiceLookup::new(
        services
            .iter()
            .enumerate()
            .map(|(index, service)| (ServiceIndex::new(index), service.provides())),
    );
    let resolver = Resolver {
        services,
        lookup: &lookup,
    };

    let dependencies = services
        .iter()
        .map(|service| {
            let requester = Requester::Service(service.id().clone());
            service
                .dependencies()
                .iter()
                .map(|dependency| {
                    Ok(ResolvedDependency {
                        reference_name: dependency.reference_name().to_string(),
                        target: resolver.resolve(&requester, dependency.spec())?,
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(ServiceDependencies)
        })
        .collect::<Result<Vec<_>>>()?;

    let external = external
        .iter()
        .map(|reference| {
            let requester = Requester::Package(reference.package_name().to_string());
            resolver
                .resolve(&requester, reference.spec())
                .map(|target| target.map(ResolvedTarget::service))
        })
        .collect::<Result<Vec<_>>>()?;

    detect_cycles(services, &dependencies)?;

    tracing::debug!(
        graph.services = services.len(),
        graph.external_references = external.len(),
        "service graph verified"
    );

    Ok(VerifiedGraph {
        lookup,
        dependencies,
        external,
    })
}

fn check_structure(services: &[ServiceDescriptor]) -> Result<()> {
    let mut ids = HashSet::new();

    for service in services {
        if !ids.insert(service.id()) {
            return Err(Error::DuplicateService {
                service: service.id().clone(),
            });
        }

        let mut provided = HashSet::new();
        for spec in service.provides() {
            if !provided.insert(spec) {
                return Err(Error::DuplicateInterface {
                    service: service.id().clone(),
                    interface: spec.interface_name().to_string(),
                    qualifier: spec.qualifier().map(str::to_string),
                });
            }
        }

        let mut reference_names = HashSet::new();
        for dependency in service.dependencies() {
            if !reference_names.insert(dependency.reference_name()) {
                return Err(Error::DuplicateReference {
                    service: service.id().clone(),
                    reference: dependency.reference_name().to_string(),
                });
            }
        }
    }

    Ok(())
}

struct Resolver<'a> {
    services: &'a [ServiceDescriptor],
    lookup: &'a ServiceLookup,
}

impl Resolver<'_> {
    fn resolve(&self, requester: &Requester, spec: &ReferenceSpec) -> Result<ReferenceValue<ResolvedTarget>> {
        match spec {
            ReferenceSpec::Single {
                interface_name,
                qualifier,
            } => match self.lookup.lookup_one(interface_name, qualifier.as_deref()) {
                LookupOne::Found(provider) => Ok(ReferenceValue::One(self.target(interface_name, provider))),
                LookupOne::NotFound => Err(Error::InterfaceNotFound {
                    requester: requester.clone(),
                    interface: interface_name.clone(),
                    qualifier: qualifier.clone(),
                }),
                LookupOne::Ambiguous(candidates) => Err(Error::AmbiguousDependency {
                    requester: requester.clone(),
                    interface: interface_name.clone(),
                    qualifier: qualifier.clone(),
                    candidates: candidates
                        .iter()
                        .map(|provider| self.services[provider.service().get()].id().clone())
                        .collect(),
                }),
            },
            ReferenceSpec::All { interface_name } => Ok(ReferenceValue::All(
                self.lookup
                    .lookup_all(interface_name)
                    .into_iter()
                    .map(|provider| self.target(interface_name, provider))
                    .collect(),
            )),
        }
    }

    fn target(&self, interface_name: &str, provider: &Provider) -> ResolvedTarget {
        let service = provider.service();
        ResolvedTarget {
            service,
            meta: ReferenceMeta::new(
                self.services[service.get()].id().clone(),
                interface_name,
                provider.qualifier().map(str::to_string),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search over the resolved references. A service seen again while it is still on
/// the traversal stack closes a cycle; a service depending on itself is the one-node case.
fn detect_cycles(services: &[ServiceDescriptor], dependencies: &[ServiceDependencies]) -> Result<()> {
    let mut marks = vec![Mark::Unvisited; services.len()];
    let mut stack = Vec::new();

    for index in 0..services.len() {
        if marks[index] == Mark::Unvisited {
            visit(ServiceIndex::new(index), dependencies, &mut marks, &mut stack).map_err(|path| Error::DependencyCycle {
                path: path
                    .into_iter()
                    .map(|index| services[index.get()].id().clone())
                    .collect(),
            })?;
        }
    }

    Ok(())
}

fn visit(
    index: ServiceIndex,
    dependencies: &[ServiceDependencies],
    marks: &mut [Mark],
    stack: &mut Vec<ServiceIndex>,
) -> Result<(), Vec<ServiceIndex>> {
    marks[index.get()] = Mark::OnStack;
    stack.push(index);

    for target in dependencies[index.get()].targets() {
        match marks[target.get()] {
            Mark::Unvisited => visit(target, dependencies, marks, stack)?,
            Mark::OnStack => {
                let start = stack.iter().position(|&entry| entry == target).unwrap_or_default();
                let mut path = stack[start..].to_vec();
                path.push(target);
                return Err(path);
            }
            Mark::Done => {}
        }
    }

    stack.pop();
    marks[index.get()] = Mark::Done;
    Ok(())
}
