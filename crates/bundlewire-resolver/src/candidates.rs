//! The candidate model: for every requirement, the capabilities still
//! eligible to satisfy it, most preferred first.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use bundlewire_core::model::{namespace, CapabilityRef, RequirementId, ResourceGraph, ResourceId};

/// Candidate selection for one permutation.
///
/// Cloning yields a fully independent model; permutations are plain clones
/// with one candidate removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidates {
    candidates: BTreeMap<RequirementId, Vec<CapabilityRef>>,
    /// Host -> attached fragments.
    fragments: BTreeMap<ResourceId, Vec<ResourceId>>,
    /// Resources being resolved in this permutation.
    resolving: BTreeSet<ResourceId>,
    optional: BTreeSet<RequirementId>,
    multiple: BTreeSet<RequirementId>,
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the ordered candidates of a requirement.
    pub fn insert(
        &mut self,
        requirement: RequirementId,
        candidates: Vec<CapabilityRef>,
        optional: bool,
        multiple: bool,
    ) {
        if optional {
            self.optional.insert(requirement);
        }
        if multiple {
            self.multiple.insert(requirement);
        }
        if candidates.is_empty() {
            self.candidates.remove(&requirement);
        } else {
            self.candidates.insert(requirement, candidates);
        }
    }

    /// Drop every candidate of a requirement.
    pub fn remove(&mut self, requirement: RequirementId) {
        self.candidates.remove(&requirement);
    }

    pub fn first_candidate(&self, requirement: RequirementId) -> Option<CapabilityRef> {
        self.candidates
            .get(&requirement)
            .and_then(|c| c.first())
            .copied()
    }

    pub fn candidates(&self, requirement: RequirementId) -> Option<&[CapabilityRef]> {
        self.candidates.get(&requirement).map(Vec::as_slice)
    }

    pub fn requirements(&self) -> impl Iterator<Item = RequirementId> + '_ {
        self.candidates.keys().copied()
    }

    pub fn is_optional(&self, requirement: RequirementId) -> bool {
        self.optional.contains(&requirement)
    }

    pub fn is_multiple(&self, requirement: RequirementId) -> bool {
        self.multiple.contains(&requirement)
    }

    /// Whether the first candidate can go without leaving a mandatory
    /// requirement unsatisfied.
    pub fn can_remove_candidate(&self, requirement: RequirementId) -> bool {
        match self.candidates.get(&requirement) {
            Some(c) => c.len() > 1 || (self.is_optional(requirement) && !c.is_empty()),
            None => false,
        }
    }

    pub fn remove_first_candidate(&mut self, requirement: RequirementId) {
        if let Some(c) = self.candidates.get_mut(&requirement) {
            if !c.is_empty() {
                c.remove(0);
            }
            if c.is_empty() {
                self.candidates.remove(&requirement);
            }
        }
    }

    /// Remove `remove` from the candidates of `requirement` and return what is left.
    pub fn clear_candidates(
        &mut self,
        requirement: RequirementId,
        remove: &HashSet<CapabilityRef>,
    ) -> Vec<CapabilityRef> {
        let Some(c) = self.candidates.get_mut(&requirement) else {
            return Vec::new();
        };
        c.retain(|cap| !remove.contains(cap));
        let remaining = c.clone();
        if remaining.is_empty() {
            self.candidates.remove(&requirement);
        }
        remaining
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Queue a copy without the first candidate of `requirement`.
    ///
    /// Nothing is queued for multiple-cardinality requirements, for
    /// requirements that cannot lose a candidate, or when an identical
    /// permutation is already waiting.
    pub fn permutate(&self, requirement: RequirementId, queue: &mut VecDeque<Candidates>) {
        if self.is_multiple(requirement) || !self.can_remove_candidate(requirement) {
            return;
        }
        let mut perm = self.copy();
        perm.remove_first_candidate(requirement);
        if queue.iter().any(|queued| *queued == perm) {
            return;
        }
        tracing::trace!(requirement = requirement.0, "queued permutation");
        queue.push_back(perm);
    }

    /// Like [`permutate`](Self::permutate), unless a queued permutation
    /// already tries a different first candidate for `requirement`.
    pub fn permutate_if_needed(&self, requirement: RequirementId, queue: &mut VecDeque<Candidates>) {
        let Some(current) = self.candidates.get(&requirement) else {
            return;
        };
        if current.len() <= 1 {
            return;
        }
        let already = queue.iter().any(|queued| {
            queued
                .first_candidate(requirement)
                .is_some_and(|first| Some(&first) != current.first())
        });
        if !already {
            self.permutate(requirement, queue);
        }
    }

    pub fn add_resolving(&mut self, resource: ResourceId) {
        self.resolving.insert(resource);
    }

    pub fn remove_resolving(&mut self, resource: ResourceId) {
        self.resolving.remove(&resource);
    }

    pub fn is_resolving(&self, resource: ResourceId) -> bool {
        self.resolving.contains(&resource)
    }

    pub fn resolving(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.resolving.iter().copied()
    }

    pub fn attach_fragment(&mut self, host: ResourceId, fragment: ResourceId) {
        let attached = self.fragments.entry(host).or_default();
        if !attached.contains(&fragment) {
            attached.push(fragment);
        }
    }

    pub fn detach_fragment(&mut self, host: ResourceId, fragment: ResourceId) {
        if let Some(attached) = self.fragments.get_mut(&host) {
            attached.retain(|f| *f != fragment);
            if attached.is_empty() {
                self.fragments.remove(&host);
            }
        }
    }

    pub fn fragments_of(&self, host: ResourceId) -> &[ResourceId] {
        self.fragments.get(&host).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Hosts a fragment is attached to.
    pub fn hosts_of(&self, fragment: ResourceId) -> Vec<ResourceId> {
        self.fragments
            .iter()
            .filter(|(_, attached)| attached.contains(&fragment))
            .map(|(host, _)| *host)
            .collect()
    }

    /// Requirements of `resource` and its attached fragments, without the
    /// fragments' host requirements.
    pub fn hosted_requirements(&self, graph: &ResourceGraph, resource: ResourceId) -> Vec<RequirementId> {
        std::iter::once(resource)
            .chain(self.fragments_of(resource).iter().copied())
            .flat_map(|r| graph.resource(r).requirements.iter().copied())
            .filter(|r| graph.requirement(*r).namespace != namespace::HOST)
            .collect()
    }

    /// Capabilities of `resource` plus those of its attached fragments,
    /// attributed to `resource`.
    pub fn hosted_capabilities(&self, graph: &ResourceGraph, resource: ResourceId) -> Vec<CapabilityRef> {
        let own = graph
            .resource(resource)
            .capabilities
            .iter()
            .map(|c| CapabilityRef::Direct(*c));
        let attached = self.fragments_of(resource).iter().flat_map(|f| {
            graph
                .resource(*f)
                .capabilities
                .iter()
                .map(move |c| CapabilityRef::attributed_to(graph, *c, resource))
        });
        own.chain(attached).collect()
    }

    /// The first mandatory requirement of a resolving resource left without candidates.
    pub fn unsatisfied_requirement(&self, graph: &ResourceGraph) -> Option<RequirementId> {
        self.resolving.iter().find_map(|r| {
            self.hosted_requirements(graph, *r)
                .into_iter()
                .find(|req| !graph.requirement(*req).is_optional() && !self.candidates.contains_key(req))
        })
    }

    /// Resources whose package space has to be checked to resolve `root`:
    /// the root itself, or the hosts a fragment root is attached to.
    pub fn check_targets(&self, graph: &ResourceGraph, root: ResourceId) -> Vec<ResourceId> {
        if graph.is_fragment(root) {
            self.hosts_of(root)
                .into_iter()
                .filter(|h| self.is_resolving(*h))
                .collect()
        } else if self.is_resolving(root) {
            vec![root]
        } else {
            Vec::new()
        }
    }
}
