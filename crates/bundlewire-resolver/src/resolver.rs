//! The permutation search driver.
//!
//! Each attempt takes the next queued permutation, rebuilds the package
//! spaces from it and checks every root. A conflict leaves new permutations
//! behind in the session; the search ends at the first permutation that
//! passes, or when the queues run dry.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use bundlewire_core::config::ResolverConfig;
use bundlewire_core::model::{namespace, CapabilityRef, ResourceGraph, ResourceId};
use bundlewire_core::wiring::Wire;

use crate::candidates::Candidates;
use crate::checker::{ConsistencyChecker, ResultCache};
use crate::conflict::{ConflictKind, ConflictReport, UsesConflict};
use crate::context::ResolveContext;
use crate::packages::build_package_spaces;
use crate::populate::{populate, Populated};
use crate::session::ResolveSession;

#[derive(Debug, Error, Diagnostic)]
pub enum ResolutionError {
    /// A mandatory resource has a requirement nothing can satisfy.
    #[error("Unable to resolve {resource}: missing requirement {requirement}")]
    #[diagnostic(help("Add a resource providing the capability, or mark the requirement optional"))]
    MissingRequirement { resource: String, requirement: String },

    /// Every permutation was tried; this is the last conflict seen.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Conflict(#[from] UsesConflict),

    /// The configured permutation limit was reached.
    #[error("Gave up after {attempts} candidate permutations")]
    #[diagnostic(help("Raise `max-permutations` in the [resolver] config section"))]
    Exhausted {
        attempts: usize,
        #[source]
        last: Option<UsesConflict>,
    },
}

/// The outcome of a successful resolve.
#[derive(Debug, Default)]
pub struct Resolution {
    /// New wires of every newly resolved resource. Fragments get their host wire.
    pub wires: BTreeMap<ResourceId, Vec<Wire>>,
    /// Optional roots left out because they could not be resolved.
    pub dropped: Vec<ResourceId>,
    /// Permutations checked.
    pub attempts: usize,
    pub conflicts: ConflictReport,
}

impl Resolution {
    pub fn resources(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.wires.keys().copied()
    }

    /// A name-based view of the result for JSON output.
    pub fn summary(&self, graph: &ResourceGraph) -> ResolutionSummary {
        let resources = self
            .wires
            .iter()
            .map(|(&resource, wires)| ResolvedResource {
                resource: graph.resource(resource).to_string(),
                fragment: graph.is_fragment(resource),
                wires: wires
                    .iter()
                    .map(|wire| {
                        let requirement = graph.requirement(wire.requirement);
                        WireSummary {
                            namespace: requirement.namespace.clone(),
                            filter: requirement.filter_text().to_string(),
                            provider: graph.resource(wire.provider(graph)).to_string(),
                            package: graph
                                .capability(wire.capability.id())
                                .package_name()
                                .map(str::to_string),
                        }
                    })
                    .collect(),
            })
            .collect();
        ResolutionSummary {
            resources,
            dropped: self
                .dropped
                .iter()
                .map(|&r| graph.resource(r).to_string())
                .collect(),
            attempts: self.attempts,
            conflicts: self
                .conflicts
                .conflicts
                .iter()
                .map(|c| ConflictSummary {
                    kind: c.kind,
                    resource: graph.resource(c.resource).to_string(),
                    package: c.package.clone(),
                    message: c.message.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolutionSummary {
    pub resources: Vec<ResolvedResource>,
    pub dropped: Vec<String>,
    pub attempts: usize,
    pub conflicts: Vec<ConflictSummary>,
}

#[derive(Debug, Serialize)]
pub struct ResolvedResource {
    pub resource: String,
    pub fragment: bool,
    pub wires: Vec<WireSummary>,
}

#[derive(Debug, Serialize)]
pub struct WireSummary {
    pub namespace: String,
    pub filter: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConflictSummary {
    pub kind: ConflictKind,
    pub resource: String,
    pub package: String,
    pub message: String,
}

enum SearchFailure {
    Conflict {
        conflict: Option<UsesConflict>,
        root: Option<ResourceId>,
    },
    Exhausted(Option<UsesConflict>),
}

pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, ctx: &dyn ResolveContext) -> Result<Resolution, ResolutionError> {
        let graph = ctx.graph();
        let mandatory = ctx.mandatory_resources();
        let mut optional = ctx.optional_resources();
        let mut dropped = Vec::new();
        let mut attempts = 0;
        let mut report = ConflictReport::new();

        loop {
            let populated = populate(ctx, &mandatory, &optional)?;
            for root in &optional {
                if !populated.optional.contains(root) && !ctx.is_wired(*root) {
                    dropped.push(*root);
                }
            }
            optional = populated.optional.clone();

            match self.search(ctx, &populated, &mut attempts, &mut report) {
                Ok(candidates) => {
                    let wires = collect_wires(ctx, &candidates, &populated);
                    tracing::info!(
                        "resolved {} resource(s) after {attempts} permutation(s), {} conflict(s)",
                        wires.len(),
                        report.len()
                    );
                    return Ok(Resolution {
                        wires,
                        dropped,
                        attempts,
                        conflicts: report,
                    });
                }
                Err(SearchFailure::Exhausted(last)) => {
                    return Err(ResolutionError::Exhausted {
                        attempts,
                        last,
                    });
                }
                Err(SearchFailure::Conflict { conflict, root }) => {
                    let faulty = root.filter(|r| optional.contains(r));
                    match faulty {
                        Some(root) if self.config.drop_faulty_optional => {
                            tracing::info!("dropping faulty optional resource {}", graph.describe(root));
                            optional.retain(|r| *r != root);
                            dropped.push(root);
                        }
                        _ => {
                            return Err(match conflict {
                                Some(conflict) => ResolutionError::Conflict(conflict),
                                None => ResolutionError::Exhausted { attempts, last: None },
                            })
                        }
                    }
                }
            }
        }
    }

    fn search(
        &self,
        ctx: &dyn ResolveContext,
        populated: &Populated,
        attempts: &mut usize,
        report: &mut ConflictReport,
    ) -> Result<Candidates, SearchFailure> {
        let graph = ctx.graph();
        let roots: Vec<ResourceId> = populated
            .mandatory
            .iter()
            .chain(&populated.optional)
            .copied()
            .collect();

        let mut session = ResolveSession::new(ctx);
        session
            .uses_permutations_mut()
            .push_back(populated.candidates.clone());

        let mut last: Option<UsesConflict> = None;
        let mut failing_root = None;

        while let Some(candidates) = session.next_permutation() {
            if let Some(req) = candidates.unsatisfied_requirement(graph) {
                tracing::trace!("discarding permutation without candidates for {}", graph.requirement(req));
                continue;
            }
            if *attempts >= self.config.max_permutations {
                return Err(SearchFailure::Exhausted(last));
            }
            *attempts += 1;

            session.reset_attempt();
            let packages = build_package_spaces(ctx, &candidates, session.sources_mut());
            let mut cache = ResultCache::new();
            let mut failed = None;
            {
                let mut checker = ConsistencyChecker::new(&mut session, &candidates);
                'roots: for &root in &roots {
                    for target in candidates.check_targets(graph, root) {
                        if let Err(conflict) = checker.check_package_space(target, &packages, &mut cache) {
                            failed = Some((root, conflict));
                            break 'roots;
                        }
                    }
                }
            }

            match failed {
                Some((root, conflict)) => {
                    report.add(conflict.clone());
                    last = Some(conflict);
                    failing_root = Some(root);
                }
                None => match session.reset_attempt() {
                    // Multiple-cardinality candidates were dropped to get here;
                    // the reduced selection has to pass on its own.
                    Some(snapshot) if snapshot != candidates => {
                        tracing::debug!("re-checking permutation with multiple-cardinality candidates removed");
                        session.uses_permutations_mut().push_front(snapshot);
                    }
                    _ => return Ok(candidates),
                },
            }
        }
        Err(SearchFailure::Conflict {
            conflict: last,
            root: failing_root,
        })
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

/// Wires for everything reachable from the roots through selected candidates.
fn collect_wires(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    populated: &Populated,
) -> BTreeMap<ResourceId, Vec<Wire>> {
    let graph = ctx.graph();
    let mut wires: BTreeMap<ResourceId, Vec<Wire>> = BTreeMap::new();
    let mut queue: VecDeque<ResourceId> = VecDeque::new();
    let mut seen = BTreeSet::new();
    for &root in populated.mandatory.iter().chain(&populated.optional) {
        for target in candidates.check_targets(graph, root) {
            if seen.insert(target) {
                queue.push_back(target);
            }
        }
    }

    while let Some(resource) = queue.pop_front() {
        let entry = wires.entry(resource).or_default();
        for req in candidates.hosted_requirements(graph, resource) {
            let selected: Vec<CapabilityRef> = if graph.requirement(req).is_multiple() {
                candidates.candidates(req).map(<[_]>::to_vec).unwrap_or_default()
            } else {
                candidates.first_candidate(req).into_iter().collect()
            };
            for capability in selected {
                entry.push(Wire {
                    requirement: req,
                    capability,
                });
                let provider = capability.resource(graph);
                if !ctx.is_wired(provider) && seen.insert(provider) {
                    queue.push_back(provider);
                }
            }
        }

        for &fragment in candidates.fragments_of(resource) {
            let host_cap = graph
                .resource(resource)
                .capabilities
                .iter()
                .copied()
                .find(|c| graph.capability(*c).namespace == namespace::HOST);
            if let (Some(req), Some(cap)) = (graph.host_requirement(fragment), host_cap) {
                wires.entry(fragment).or_default().push(Wire {
                    requirement: req,
                    capability: CapabilityRef::Direct(cap),
                });
            }
        }
    }
    wires
}
