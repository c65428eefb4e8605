//! Builds the initial candidate model from a resolve context.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bundlewire_core::model::{CapabilityId, CapabilityRef, RequirementId, ResourceId};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::resolver::ResolutionError;

/// The initial candidate model and the roots that survived population.
#[derive(Debug, Clone)]
pub struct Populated {
    pub candidates: Candidates,
    pub mandatory: Vec<ResourceId>,
    pub optional: Vec<ResourceId>,
}

/// Populate candidates for `mandatory` and `optional` roots.
///
/// Unresolved fragments attach to every unresolved bundle their host
/// requirement matches. A resource fails when one of its mandatory
/// requirements is left without candidates; failures propagate until
/// stable. A failed mandatory root is an error, failed optional roots are
/// dropped.
pub fn populate(
    ctx: &dyn ResolveContext,
    mandatory: &[ResourceId],
    optional: &[ResourceId],
) -> Result<Populated, ResolutionError> {
    let graph = ctx.graph();
    let mut candidates = Candidates::new();

    for fragment in graph.resources().map(|r| r.id) {
        if ctx.is_wired(fragment) {
            continue;
        }
        let Some(host_req) = graph.host_requirement(fragment) else {
            continue;
        };
        for cap in ctx.find_providers(host_req) {
            let host = graph.capability(cap).resource;
            if !ctx.is_wired(host) && !graph.is_fragment(host) {
                candidates.attach_fragment(host, fragment);
            }
        }
    }

    let mut queue: VecDeque<ResourceId> = VecDeque::new();
    let mut seen: BTreeSet<ResourceId> = BTreeSet::new();
    for &root in mandatory.iter().chain(optional) {
        let start = if graph.is_fragment(root) {
            candidates.hosts_of(root)
        } else {
            vec![root]
        };
        for resource in start {
            if !ctx.is_wired(resource) && seen.insert(resource) {
                queue.push_back(resource);
            }
        }
    }

    while let Some(resource) = queue.pop_front() {
        candidates.add_resolving(resource);
        for req in candidates.hosted_requirements(graph, resource) {
            let requirement = graph.requirement(req);
            let mut found = Vec::new();
            for cap in ctx.find_providers(req) {
                found.extend(attribute(ctx, &candidates, cap));
            }
            for cap in &found {
                let provider = cap.resource(graph);
                if !ctx.is_wired(provider) && seen.insert(provider) {
                    queue.push_back(provider);
                }
            }
            candidates.insert(req, found, requirement.is_optional(), requirement.is_multiple());
        }
    }

    let failures = propagate_failures(ctx, &mut candidates);

    let mut kept_mandatory = Vec::new();
    for &root in mandatory {
        if ctx.is_wired(root) {
            continue;
        }
        if root_resolvable(ctx, &candidates, root) {
            kept_mandatory.push(root);
        } else {
            return Err(missing_requirement(ctx, &failures, root));
        }
    }
    let mut kept_optional = Vec::new();
    for &root in optional {
        if ctx.is_wired(root) {
            continue;
        }
        if root_resolvable(ctx, &candidates, root) {
            kept_optional.push(root);
        } else {
            tracing::debug!("dropping optional resource {}: {}", graph.describe(root), missing_requirement(ctx, &failures, root));
        }
    }

    Ok(Populated {
        candidates,
        mandatory: kept_mandatory,
        optional: kept_optional,
    })
}

/// The capability references a provider capability stands for: itself, or
/// one wrapped reference per host when it comes from a fragment.
fn attribute(ctx: &dyn ResolveContext, candidates: &Candidates, cap: CapabilityId) -> Vec<CapabilityRef> {
    let graph = ctx.graph();
    let declaring = graph.capability(cap).resource;
    if !graph.is_fragment(declaring) {
        return vec![CapabilityRef::Direct(cap)];
    }
    if ctx.is_wired(declaring) {
        return ctx
            .wirings()
            .iter()
            .filter(|(host, wiring)| **host != declaring && wiring.capabilities.contains(&cap))
            .map(|(host, _)| CapabilityRef::attributed_to(graph, cap, *host))
            .collect();
    }
    candidates
        .hosts_of(declaring)
        .into_iter()
        .map(|host| CapabilityRef::attributed_to(graph, cap, host))
        .collect()
}

/// Remove resources with unsatisfiable mandatory requirements, detaching
/// fragments instead of failing their hosts, until nothing changes.
/// Returns the requirement each failed resource was missing.
fn propagate_failures(
    ctx: &dyn ResolveContext,
    candidates: &mut Candidates,
) -> BTreeMap<ResourceId, RequirementId> {
    let graph = ctx.graph();
    let mut failures = BTreeMap::new();
    loop {
        let mut changed = false;
        let resolving: Vec<ResourceId> = candidates.resolving().collect();
        for resource in resolving {
            let missing = candidates
                .hosted_requirements(graph, resource)
                .into_iter()
                .find(|req| !graph.requirement(*req).is_optional() && candidates.candidates(*req).is_none());
            let Some(req) = missing else {
                continue;
            };
            let owner = graph.requirement(req).resource;
            changed = true;
            if owner != resource {
                tracing::debug!("detaching fragment {} from {}", graph.describe(owner), graph.describe(resource));
                drop_requirements_of(ctx, candidates, owner);
                candidates.detach_fragment(resource, owner);
                failures.entry(owner).or_insert(req);
                remove_capabilities(ctx, candidates, |cap| {
                    matches!(cap, CapabilityRef::Wrapped { host, capability }
                        if host == resource && graph.capability(capability).resource == owner)
                });
            } else {
                drop_requirements_of(ctx, candidates, resource);
                candidates.remove_resolving(resource);
                for fragment in candidates.fragments_of(resource).to_vec() {
                    candidates.detach_fragment(resource, fragment);
                }
                failures.entry(resource).or_insert(req);
                remove_capabilities(ctx, candidates, |cap| cap.resource(graph) == resource);
            }
        }
        if !changed {
            return failures;
        }
    }
}

fn drop_requirements_of(ctx: &dyn ResolveContext, candidates: &mut Candidates, resource: ResourceId) {
    let graph = ctx.graph();
    for req in candidates.hosted_requirements(graph, resource) {
        candidates.remove(req);
    }
}

/// Remove every candidate matching `doomed`, dropping requirements left empty.
fn remove_capabilities(
    ctx: &dyn ResolveContext,
    candidates: &mut Candidates,
    doomed: impl Fn(CapabilityRef) -> bool,
) {
    let graph = ctx.graph();
    let reqs: Vec<RequirementId> = candidates.requirements().collect();
    for req in reqs {
        let Some(current) = candidates.candidates(req) else {
            continue;
        };
        if !current.iter().any(|c| doomed(*c)) {
            continue;
        }
        let kept: Vec<CapabilityRef> = current.iter().copied().filter(|c| !doomed(*c)).collect();
        let requirement = graph.requirement(req);
        candidates.insert(req, kept, requirement.is_optional(), requirement.is_multiple());
    }
}

fn root_resolvable(ctx: &dyn ResolveContext, candidates: &Candidates, root: ResourceId) -> bool {
    !candidates.check_targets(ctx.graph(), root).is_empty()
}

fn missing_requirement(
    ctx: &dyn ResolveContext,
    failures: &BTreeMap<ResourceId, RequirementId>,
    root: ResourceId,
) -> ResolutionError {
    let graph = ctx.graph();
    let requirement = failures
        .get(&root)
        .copied()
        .or_else(|| graph.host_requirement(root))
        .map(|req| graph.requirement(req).to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    ResolutionError::MissingRequirement {
        resource: graph.describe(root),
        requirement,
    }
}
