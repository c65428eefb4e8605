//! The package-space consistency checker.
//!
//! Given a candidate selection and the package spaces derived from it, the
//! checker verifies that no resource can see two incompatible providers of
//! the same package. On a conflict it queues alternative permutations in the
//! session before failing, so the driver always has something new to try
//! unless the search space is exhausted.

use std::collections::{BTreeMap, HashSet};

use bundlewire_core::model::{CapabilityRef, RequirementId, ResourceGraph, ResourceId};

use crate::candidates::Candidates;
use crate::conflict::{render_blame, ConflictKind, UsesConflict};
use crate::packages::{Blame, PackageMap, UsedBlames};
use crate::session::ResolveSession;

/// Resources whose package space passed during the current attempt.
pub type ResultCache = HashSet<ResourceId>;

pub struct ConsistencyChecker<'s, 'a> {
    session: &'s mut ResolveSession<'a>,
    candidates: &'s Candidates,
}

impl<'s, 'a> ConsistencyChecker<'s, 'a> {
    pub fn new(session: &'s mut ResolveSession<'a>, candidates: &'s Candidates) -> Self {
        Self {
            session,
            candidates,
        }
    }

    /// Check `resource` and everything it is wired to. Already-resolved
    /// resources are accepted as they are.
    pub fn check_package_space(
        &mut self,
        resource: ResourceId,
        packages: &PackageMap,
        cache: &mut ResultCache,
    ) -> Result<(), UsesConflict> {
        if self.session.context().is_wired(resource) {
            return Ok(());
        }
        self.check_dynamic_package_space(resource, packages, cache)
    }

    pub fn check_dynamic_package_space(
        &mut self,
        resource: ResourceId,
        packages: &PackageMap,
        cache: &mut ResultCache,
    ) -> Result<(), UsesConflict> {
        if cache.contains(&resource) {
            return Ok(());
        }
        let graph = self.session.context().graph();
        let Some(pkgs) = packages.get(&resource) else {
            tracing::debug!("no package space for {}, nothing to check", graph.describe(resource));
            return Ok(());
        };

        self.check_fragment_imports(resource, &pkgs.imported)?;

        let mut permutation: Option<Candidates> = None;
        let mut mutated: HashSet<RequirementId> = HashSet::new();

        for (package, export_blame) in &pkgs.exported {
            let Some(used) = pkgs.used.get(package) else {
                continue;
            };
            let mut rethrow: Option<UsesConflict> = None;
            for used_blames in used.values() {
                if self.is_compatible(std::slice::from_ref(export_blame), Some(used_blames.cap), packages) {
                    continue;
                }
                for used_blame in &used_blames.blames {
                    if self.check_multiple(used_blames, used_blame) {
                        continue;
                    }
                    let permutation = permutation.get_or_insert_with(|| self.candidates.copy());
                    if rethrow.is_none() {
                        rethrow = Some(self.export_conflict(resource, package, used_blame));
                    }
                    mutate_blame_chain(graph, permutation, &mut mutated, used_blame);
                }
            }
            if let Some(conflict) = rethrow {
                if !mutated.is_empty() {
                    if let Some(permutation) = permutation.take() {
                        self.session.uses_permutations_mut().push_back(permutation);
                    }
                }
                return Err(self.raise(
                    conflict,
                    "candidate permutation failed due to a conflict between an export and import",
                ));
            }
        }

        // Imports shadow packages of the same name from required bundles.
        let mut import_require: BTreeMap<&str, &Vec<Blame>> = BTreeMap::new();
        for (package, blames) in pkgs.required.iter().chain(&pkgs.imported) {
            import_require.insert(package.as_str(), blames);
        }

        for (package, requirement_blames) in import_require {
            let Some(used) = pkgs.used.get(package) else {
                continue;
            };
            let Some(requirement_blame) = requirement_blames.first() else {
                continue;
            };
            let mut rethrow: Option<UsesConflict> = None;
            for used_blames in used.values() {
                if self.is_compatible(requirement_blames, Some(used_blames.cap), packages) {
                    continue;
                }
                for used_blame in &used_blames.blames {
                    if self.check_multiple(used_blames, used_blame) {
                        continue;
                    }
                    let permutation = permutation.get_or_insert_with(|| self.candidates.copy());
                    if rethrow.is_none() {
                        rethrow = Some(self.import_conflict(resource, package, requirement_blame, used_blame));
                    }
                    mutate_blame_chain(graph, permutation, &mut mutated, used_blame);
                }
            }
            if let Some(conflict) = rethrow {
                if !mutated.is_empty() {
                    if let Some(permutation) = permutation.take() {
                        self.session.uses_permutations_mut().push_back(permutation);
                    }
                }
                // Also backtrack on the original import decision in case no
                // permutation of the uses side works out.
                for blame in requirement_blames {
                    if let Some(req) = blame.root_requirement() {
                        if !mutated.contains(&req) {
                            self.candidates
                                .permutate_if_needed(req, self.session.import_permutations_mut());
                        }
                    }
                }
                return Err(self.raise(
                    conflict,
                    "candidate permutation failed due to a conflict between imports",
                ));
            }
        }

        cache.insert(resource);

        let before = self.session.permutation_count();
        let candidates = self.candidates;
        for req in candidates.hosted_requirements(graph, resource) {
            let Some(cap) = candidates.first_candidate(req) else {
                continue;
            };
            let provider = cap.resource(graph);
            if provider == resource {
                continue;
            }
            if let Err(mut conflict) = self.check_package_space(provider, packages, cache) {
                if conflict.permutation_count == before {
                    // Nothing below could be changed: back off this edge instead.
                    candidates.permutate(req, self.session.import_permutations_mut());
                    conflict.permutation_count = self.session.permutation_count();
                }
                return Err(conflict);
            }
        }
        Ok(())
    }

    /// Imports of one package must all come from the same resource.
    fn check_fragment_imports(
        &mut self,
        resource: ResourceId,
        imported: &BTreeMap<String, Vec<Blame>>,
    ) -> Result<(), UsesConflict> {
        let graph = self.session.context().graph();
        for (package, blames) in imported {
            let Some((source, rest)) = blames.split_first() else {
                continue;
            };
            let source_resource = source.cap.resource(graph);
            let Some(other) = rest.iter().find(|b| b.cap.resource(graph) != source_resource) else {
                continue;
            };
            let (Some(other_req), Some(source_req)) = (other.root_requirement(), source.root_requirement())
            else {
                continue;
            };
            self.candidates
                .permutate(other_req, self.session.import_permutations_mut());
            self.candidates
                .permutate(source_req, self.session.import_permutations_mut());

            let message = self.two_chain_message(resource, package, source, other);
            let conflict = UsesConflict {
                kind: ConflictKind::FragmentImport,
                resource,
                package: package.clone(),
                message,
                requirements: vec![other_req],
                permutation_count: 0,
            };
            return Err(self.raise(
                conflict,
                "candidate permutation failed due to a conflict with a fragment import",
            ));
        }
        Ok(())
    }

    /// Whether `candidate` provides a package compatible with the one the
    /// `current` blames already provide: one source set must contain the other.
    pub fn is_compatible(
        &mut self,
        current: &[Blame],
        candidate: Option<CapabilityRef>,
        packages: &PackageMap,
    ) -> bool {
        let Some(candidate) = candidate else {
            return true;
        };
        if current.is_empty() {
            return true;
        }
        if let [only] = current {
            if only.cap == candidate {
                return true;
            }
        }

        let ctx = self.session.context();
        let sources = self.session.sources_mut();
        let mut current_sources: HashSet<CapabilityRef> = HashSet::new();
        for blame in current {
            current_sources.extend(sources.sources(ctx, self.candidates, blame.cap, packages).iter().copied());
        }
        let candidate_sources = sources.sources(ctx, self.candidates, candidate, packages);

        current_sources.is_superset(candidate_sources) || candidate_sources.is_superset(&current_sources)
    }

    /// For a chain rooted in a multiple-cardinality requirement, drop the
    /// offending candidates from the multiplicity snapshot instead of
    /// failing. Succeeds while the requirement keeps at least one candidate.
    fn check_multiple(&mut self, used_blames: &UsedBlames, used_blame: &Blame) -> bool {
        let graph = self.session.context().graph();
        let Some(req) = used_blame.root_requirement() else {
            return false;
        };
        if !graph.requirement(req).is_multiple() {
            return false;
        }
        let causes = used_blames.root_causes(req);
        !self
            .session
            .clear_multiple_candidates(self.candidates, req, &causes)
            .is_empty()
    }

    fn export_conflict(&self, resource: ResourceId, package: &str, used_blame: &Blame) -> UsesConflict {
        let ctx = self.session.context();
        let graph = ctx.graph();
        let message = format!(
            "Uses constraint violation. Unable to resolve resource {} because it exports package '{package}' \
             and is also exposed to it from resource {} via the following dependency chain:\n\n{}",
            graph.describe(resource),
            graph.describe(used_blame.cap.resource(graph)),
            render_blame(ctx, self.candidates, used_blame),
        );
        UsesConflict {
            kind: ConflictKind::ExportUses,
            resource,
            package: package.to_string(),
            message,
            requirements: used_blame.reqs.clone(),
            permutation_count: 0,
        }
    }

    fn import_conflict(
        &self,
        resource: ResourceId,
        package: &str,
        requirement_blame: &Blame,
        used_blame: &Blame,
    ) -> UsesConflict {
        let mut requirements: Vec<RequirementId> = requirement_blame.root_requirement().into_iter().collect();
        requirements.extend(used_blame.reqs.iter().copied());
        UsesConflict {
            kind: ConflictKind::ImportUses,
            resource,
            package: package.to_string(),
            message: self.two_chain_message(resource, package, requirement_blame, used_blame),
            requirements,
            permutation_count: 0,
        }
    }

    fn two_chain_message(&self, resource: ResourceId, package: &str, first: &Blame, second: &Blame) -> String {
        let ctx = self.session.context();
        let graph = ctx.graph();
        format!(
            "Uses constraint violation. Unable to resolve resource {} because it is exposed to package \
             '{package}' from resources {} and {} via two dependency chains.\n\nChain 1:\n{}\n\nChain 2:\n{}",
            graph.describe(resource),
            graph.describe(first.cap.resource(graph)),
            graph.describe(second.cap.resource(graph)),
            render_blame(ctx, self.candidates, first),
            render_blame(ctx, self.candidates, second),
        )
    }

    /// Stamp the conflict with the current permutation count and log it.
    fn raise(&self, mut conflict: UsesConflict, reason: &str) -> UsesConflict {
        conflict.permutation_count = self.session.permutation_count();
        tracing::debug!(
            kind = %conflict.kind,
            package = %conflict.package,
            permutations = conflict.permutation_count,
            "{reason}; will try another if possible: {}",
            conflict.message
        );
        conflict
    }
}

/// Remove the first candidate of the deepest requirement in the chain that
/// can lose one, unless that hop was already changed for another conflict.
fn mutate_blame_chain(
    graph: &ResourceGraph,
    permutation: &mut Candidates,
    mutated: &mut HashSet<RequirementId>,
    blame: &Blame,
) {
    for &req in blame.reqs.iter().rev() {
        if graph.requirement(req).is_multiple() {
            continue;
        }
        if mutated.contains(&req) {
            break;
        }
        if permutation.can_remove_candidate(req) {
            permutation.remove_first_candidate(req);
            mutated.insert(req);
            break;
        }
    }
}
