//! Per-resource package spaces and the builder that derives them from a
//! candidate selection.

use std::collections::{BTreeMap, HashMap, HashSet};

use bundlewire_core::model::{namespace, CapabilityRef, RequirementId, ResourceId};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::sources::{visible_capabilities, CapabilitySources};

/// Why a package is visible: the requirement chain and the capability
/// satisfying its last hop. Exported packages have an empty chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blame {
    pub cap: CapabilityRef,
    pub reqs: Vec<RequirementId>,
}

impl Blame {
    pub fn new(cap: CapabilityRef, reqs: Vec<RequirementId>) -> Self {
        Self { cap, reqs }
    }

    pub fn root_requirement(&self) -> Option<RequirementId> {
        self.reqs.first().copied()
    }
}

/// Every chain that reaches the same capability through `uses`.
#[derive(Debug, Clone)]
pub struct UsedBlames {
    pub cap: CapabilityRef,
    pub blames: Vec<Blame>,
    root_causes: HashMap<RequirementId, HashSet<CapabilityRef>>,
}

impl UsedBlames {
    pub fn new(cap: CapabilityRef) -> Self {
        Self {
            cap,
            blames: Vec::new(),
            root_causes: HashMap::new(),
        }
    }

    /// Add a chain. `matching_root_cause` is the candidate of the chain's
    /// root requirement that led here, recorded for multiple-cardinality roots.
    pub fn add_blame(&mut self, blame: Blame, matching_root_cause: Option<CapabilityRef>) {
        if let (Some(cause), Some(root)) = (matching_root_cause, blame.root_requirement()) {
            self.root_causes.entry(root).or_default().insert(cause);
        }
        self.blames.push(blame);
    }

    /// Candidates of `requirement` responsible for reaching this capability.
    pub fn root_causes(&self, requirement: RequirementId) -> HashSet<CapabilityRef> {
        self.root_causes
            .get(&requirement)
            .cloned()
            .unwrap_or_default()
    }
}

/// The packages visible to one resource.
#[derive(Debug, Clone, Default)]
pub struct Packages {
    pub exported: BTreeMap<String, Blame>,
    /// More than one blame only when fragments import the same package.
    pub imported: BTreeMap<String, Vec<Blame>>,
    pub required: BTreeMap<String, Vec<Blame>>,
    pub used: BTreeMap<String, BTreeMap<CapabilityRef, UsedBlames>>,
}

impl Packages {
    /// Blames for `package` as the resource itself sees it: its export,
    /// else its import, else what its required bundles provide.
    pub fn visible(&self, package: &str) -> Option<Vec<Blame>> {
        if let Some(blame) = self.exported.get(package) {
            return Some(vec![blame.clone()]);
        }
        self.imported
            .get(package)
            .or_else(|| self.required.get(package))
            .cloned()
    }
}

pub type PackageMap = HashMap<ResourceId, Packages>;

/// Compute the package space of every resource in the resolution and of
/// every already-wired resource.
pub fn build_package_spaces(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    sources: &mut CapabilitySources,
) -> PackageMap {
    let mut resources: Vec<ResourceId> = candidates.resolving().collect();
    resources.extend(ctx.wirings().keys().copied().filter(|r| !ctx.graph().is_fragment(*r)));

    let mut packages = PackageMap::new();
    for &resource in &resources {
        let mut pkgs = Packages::default();
        pkgs.exported = exported_packages(ctx, candidates, resource);
        packages.insert(resource, pkgs);
    }
    for &resource in &resources {
        let (imported, required) = wired_packages(ctx, candidates, &packages, resource);
        if let Some(pkgs) = packages.get_mut(&resource) {
            pkgs.imported = imported;
            pkgs.required = required;
        }
    }

    let mut used_by_resource = Vec::new();
    for resource in candidates.resolving() {
        let used = UsesMerger {
            ctx,
            candidates,
            packages: &packages,
            sources: &mut *sources,
            current: resource,
        }
        .merge_all();
        used_by_resource.push((resource, used));
    }
    for (resource, used) in used_by_resource {
        if let Some(pkgs) = packages.get_mut(&resource) {
            pkgs.used = used;
        }
    }
    packages
}

fn exported_packages(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
) -> BTreeMap<String, Blame> {
    let graph = ctx.graph();
    let mut exports = BTreeMap::new();
    for cap in visible_capabilities(ctx, candidates, resource) {
        if let Some(package) = graph.capability(cap.id()).package_name() {
            exports.insert(package.to_string(), Blame::new(cap, Vec::new()));
        }
    }
    if ctx.is_wired(resource) {
        return exports;
    }
    // An export is substituted when the resource imports the package from elsewhere.
    for req in candidates.hosted_requirements(graph, resource) {
        if graph.requirement(req).namespace != namespace::PACKAGE {
            continue;
        }
        if let Some(first) = candidates.first_candidate(req) {
            if first.resource(graph) != resource {
                if let Some(package) = graph.capability(first.id()).package_name() {
                    exports.remove(package);
                }
            }
        }
    }
    exports
}

/// The requirement -> capability pairs a resource is (tentatively) wired with.
fn selected_wires(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
) -> Vec<(RequirementId, CapabilityRef)> {
    let graph = ctx.graph();
    if let Some(wiring) = ctx.wirings().get(&resource) {
        return wiring
            .wires
            .iter()
            .map(|w| (w.requirement, w.capability))
            .collect();
    }
    let mut selected = Vec::new();
    for req in candidates.hosted_requirements(graph, resource) {
        if graph.requirement(req).is_multiple() {
            for cap in candidates.candidates(req).unwrap_or(&[]) {
                selected.push((req, *cap));
            }
        } else if let Some(cap) = candidates.first_candidate(req) {
            selected.push((req, cap));
        }
    }
    selected
}

type PackageBlames = BTreeMap<String, Vec<Blame>>;

fn wired_packages(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    packages: &PackageMap,
    resource: ResourceId,
) -> (PackageBlames, PackageBlames) {
    let graph = ctx.graph();
    let mut imported = PackageBlames::new();
    let mut required = PackageBlames::new();
    for (req, cap) in selected_wires(ctx, candidates, resource) {
        match graph.requirement(req).namespace.as_str() {
            namespace::PACKAGE => {
                if cap.resource(graph) == resource {
                    continue;
                }
                if let Some(package) = graph.capability(cap.id()).package_name() {
                    imported
                        .entry(package.to_string())
                        .or_default()
                        .push(Blame::new(cap, vec![req]));
                }
            }
            namespace::BUNDLE => {
                let mut visited = HashSet::new();
                merge_required_bundle(ctx, candidates, packages, req, cap, &mut required, &mut visited);
            }
            _ => {}
        }
    }
    (imported, required)
}

/// Add the packages a required bundle provides, following its reexported
/// bundle requirements.
fn merge_required_bundle(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    packages: &PackageMap,
    req: RequirementId,
    bundle_cap: CapabilityRef,
    required: &mut PackageBlames,
    visited: &mut HashSet<CapabilityRef>,
) {
    if !visited.insert(bundle_cap) {
        return;
    }
    let graph = ctx.graph();
    let provider = bundle_cap.resource(graph);

    let exported: Vec<CapabilityRef> = match ctx.wirings().get(&provider) {
        Some(_) => visible_capabilities(ctx, candidates, provider)
            .into_iter()
            .filter(|c| graph.capability(c.id()).is_package())
            .collect(),
        None => packages
            .get(&provider)
            .map(|p| p.exported.values().map(|b| b.cap).collect())
            .unwrap_or_default(),
    };
    for cap in exported {
        if let Some(package) = graph.capability(cap.id()).package_name() {
            required
                .entry(package.to_string())
                .or_default()
                .push(Blame::new(cap, vec![req]));
        }
    }

    for (provider_req, cap) in selected_wires(ctx, candidates, provider) {
        let r = graph.requirement(provider_req);
        if r.namespace == namespace::BUNDLE && r.is_reexport() {
            merge_required_bundle(ctx, candidates, packages, req, cap, required, visited);
        }
    }
}

type UsedPackages = BTreeMap<String, BTreeMap<CapabilityRef, UsedBlames>>;

/// Follows `uses` directives out of everything one resource is wired to.
struct UsesMerger<'a, 's> {
    ctx: &'a dyn ResolveContext,
    candidates: &'a Candidates,
    packages: &'a PackageMap,
    sources: &'s mut CapabilitySources,
    current: ResourceId,
}

impl UsesMerger<'_, '_> {
    fn merge_all(mut self) -> UsedPackages {
        let (ctx, packages) = (self.ctx, self.packages);
        let graph = ctx.graph();
        let mut used = UsedPackages::new();
        let Some(pkgs) = packages.get(&self.current) else {
            return used;
        };

        let mut roots: Vec<(RequirementId, CapabilityRef)> = Vec::new();
        for (req, cap) in selected_wires(ctx, self.candidates, self.current) {
            let ns = graph.requirement(req).namespace.as_str();
            if ns != namespace::PACKAGE && ns != namespace::BUNDLE {
                roots.push((req, cap));
            }
        }
        for blame in pkgs.imported.values().chain(pkgs.required.values()).flatten() {
            if let Some(req) = blame.root_requirement() {
                roots.push((req, blame.cap));
            }
        }

        for (req, cap) in roots {
            let matching = graph.requirement(req).is_multiple().then_some(cap);
            let mut visited = HashSet::new();
            self.merge_uses(&mut used, cap, &[req], matching, &mut visited);
        }
        used
    }

    fn merge_uses(
        &mut self,
        used: &mut UsedPackages,
        merge_cap: CapabilityRef,
        chain: &[RequirementId],
        matching: Option<CapabilityRef>,
        visited: &mut HashSet<CapabilityRef>,
    ) {
        let (ctx, packages) = (self.ctx, self.packages);
        let graph = ctx.graph();
        if merge_cap.resource(graph) == self.current || !visited.insert(merge_cap) {
            return;
        }

        let mut sources: Vec<CapabilityRef> = self
            .sources
            .sources(ctx, self.candidates, merge_cap, packages)
            .iter()
            .copied()
            .collect();
        sources.sort();

        for source in sources {
            let uses: Vec<String> = graph
                .capability(source.id())
                .uses()
                .into_iter()
                .map(str::to_string)
                .collect();
            let Some(source_pkgs) = packages.get(&source.resource(graph)) else {
                continue;
            };
            for used_package in uses {
                let Some(blames) = source_pkgs.visible(&used_package) else {
                    continue;
                };
                for blame in blames {
                    let mut next = chain.to_vec();
                    if let Some(last) = blame.reqs.last() {
                        next.push(*last);
                    }
                    used.entry(used_package.clone())
                        .or_default()
                        .entry(blame.cap)
                        .or_insert_with(|| UsedBlames::new(blame.cap))
                        .add_blame(Blame::new(blame.cap, next.clone()), matching);
                    self.merge_uses(used, blame.cap, &next, matching, visited);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlewire_core::model::CapabilityId;

    #[test]
    fn used_blames_track_root_causes_per_requirement() {
        let used_cap = CapabilityRef::Direct(CapabilityId(9));
        let cause = CapabilityRef::Direct(CapabilityId(3));
        let mut used = UsedBlames::new(used_cap);
        used.add_blame(Blame::new(used_cap, vec![RequirementId(0), RequirementId(5)]), Some(cause));
        used.add_blame(Blame::new(used_cap, vec![RequirementId(1)]), None);

        assert_eq!(used.blames.len(), 2);
        assert_eq!(used.root_causes(RequirementId(0)), HashSet::from([cause]));
        assert!(used.root_causes(RequirementId(1)).is_empty());
        assert!(used.root_causes(RequirementId(5)).is_empty());
    }

    #[test]
    fn visible_prefers_export_then_import() {
        let cap = |n| CapabilityRef::Direct(CapabilityId(n));
        let mut pkgs = Packages::default();
        pkgs.required
            .insert("p".into(), vec![Blame::new(cap(1), vec![RequirementId(0)])]);
        assert_eq!(pkgs.visible("p").unwrap()[0].cap, cap(1));

        pkgs.imported
            .insert("p".into(), vec![Blame::new(cap(2), vec![RequirementId(1)])]);
        assert_eq!(pkgs.visible("p").unwrap()[0].cap, cap(2));

        pkgs.exported.insert("p".into(), Blame::new(cap(3), Vec::new()));
        let visible = pkgs.visible("p").unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].cap, cap(3));
        assert!(pkgs.visible("q").is_none());
    }
}
