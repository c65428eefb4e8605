//! Package source equivalence.
//!
//! Two chains that reach a package are compatible when the capabilities
//! that really provide it are related by subset. The sources of a package
//! capability are every capability of the same package visible through its
//! resource, plus the sources reached through that resource's required
//! bundles.

use std::collections::{HashMap, HashSet};

use bundlewire_core::model::{CapabilityRef, ResourceId};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::packages::PackageMap;

/// Memoized source sets, keyed by the capability asked about.
///
/// Package entries depend on the wirings and on the package spaces of the
/// attempt that computed them; [`clear`](Self::clear) before reuse.
#[derive(Debug, Default)]
pub struct CapabilitySources {
    cache: HashMap<CapabilityRef, HashSet<CapabilityRef>>,
}

impl CapabilitySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// The capabilities equivalent to `cap` for uses-constraint comparison.
    ///
    /// A capability outside the package namespace is its own source when it
    /// carries a `uses` directive and has no sources otherwise.
    pub fn sources(
        &mut self,
        ctx: &dyn ResolveContext,
        candidates: &Candidates,
        cap: CapabilityRef,
        packages: &PackageMap,
    ) -> &HashSet<CapabilityRef> {
        self.cache.entry(cap).or_insert_with(|| {
            let declared = ctx.graph().capability(cap.id());
            if declared.is_package() {
                let mut sources = HashSet::new();
                let mut visited = HashSet::new();
                collect_package_sources(ctx, candidates, cap, packages, &mut sources, &mut visited);
                sources
            } else if declared.uses().is_empty() {
                HashSet::new()
            } else {
                HashSet::from([cap])
            }
        })
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn collect_package_sources(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    cap: CapabilityRef,
    packages: &PackageMap,
    sources: &mut HashSet<CapabilityRef>,
    visited: &mut HashSet<CapabilityRef>,
) {
    let graph = ctx.graph();
    let Some(package) = graph.capability(cap.id()).package_name() else {
        return;
    };
    if !visited.insert(cap) {
        return;
    }

    let resource = cap.resource(graph);
    for source in visible_capabilities(ctx, candidates, resource) {
        if graph.capability(source.id()).package_name() == Some(package) {
            sources.insert(source);
        }
    }

    let required = packages
        .get(&resource)
        .and_then(|pkgs| pkgs.required.get(package));
    for blame in required.into_iter().flatten() {
        collect_package_sources(ctx, candidates, blame.cap, packages, sources, visited);
    }
}

/// Capabilities visible through `resource`, attributed to it: its wiring
/// when resolved, otherwise its own plus those of attached fragments.
pub(crate) fn visible_capabilities(
    ctx: &dyn ResolveContext,
    candidates: &Candidates,
    resource: ResourceId,
) -> Vec<CapabilityRef> {
    let graph = ctx.graph();
    match ctx.wirings().get(&resource) {
        Some(wiring) => wiring
            .capabilities
            .iter()
            .map(|c| CapabilityRef::attributed_to(graph, *c, resource))
            .collect(),
        None => candidates.hosted_capabilities(graph, resource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::{Blame, Packages};
    use bundlewire_core::model::{directives, Attributes, CapabilityId, ResourceGraph, RequirementId};
    use bundlewire_core::version::Version;
    use bundlewire_core::wiring::{Wiring, Wirings};

    struct TestContext {
        graph: ResourceGraph,
        wirings: Wirings,
    }

    impl ResolveContext for TestContext {
        fn graph(&self) -> &ResourceGraph {
            &self.graph
        }
        fn wirings(&self) -> &Wirings {
            &self.wirings
        }
        fn mandatory_resources(&self) -> Vec<ResourceId> {
            Vec::new()
        }
        fn find_providers(&self, _: RequirementId) -> Vec<CapabilityId> {
            Vec::new()
        }
    }

    fn v1() -> Version {
        Version::new(1, 0, 0)
    }

    #[test]
    fn generic_capability_sources_depend_on_uses() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v1());
        let plain = graph.add_capability(a, "osgi.extender", Attributes::new(), Default::default());
        let using = graph.add_capability(a, "osgi.extender", Attributes::new(), directives(&[("uses", "p")]));
        let ctx = TestContext { graph, wirings: Wirings::new() };

        let mut sources = CapabilitySources::new();
        let candidates = Candidates::new();
        let packages = PackageMap::new();
        assert!(sources
            .sources(&ctx, &candidates, CapabilityRef::Direct(plain), &packages)
            .is_empty());
        let s = sources.sources(&ctx, &candidates, CapabilityRef::Direct(using), &packages);
        assert_eq!(s, &HashSet::from([CapabilityRef::Direct(using)]));
    }

    #[test]
    fn same_package_exported_twice_is_one_source_set() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v1());
        let p1 = graph.export_package(a, "p", v1(), &[]);
        let p2 = graph.export_package(a, "p", Version::new(1, 1, 0), &[]);
        graph.export_package(a, "q", v1(), &[]);
        let ctx = TestContext { graph, wirings: Wirings::new() };

        let mut sources = CapabilitySources::new();
        let mut candidates = Candidates::new();
        candidates.add_resolving(a);
        let s = sources
            .sources(&ctx, &candidates, CapabilityRef::Direct(p1), &PackageMap::new())
            .clone();
        let expected = HashSet::from([CapabilityRef::Direct(p1), CapabilityRef::Direct(p2)]);
        assert_eq!(s, expected);

        // Memoized: same content on the second call.
        let again = sources.sources(&ctx, &candidates, CapabilityRef::Direct(p1), &PackageMap::new());
        assert_eq!(again, &expected);
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn fragment_sources_are_attributed_to_host() {
        let mut graph = ResourceGraph::new();
        let host = graph.add_bundle("host", v1());
        let own = graph.export_package(host, "p", v1(), &[]);
        let frag = graph.add_fragment("frag", v1(), "host").unwrap();
        let contributed = graph.export_package(frag, "p", v1(), &[]);
        let ctx = TestContext { graph, wirings: Wirings::new() };

        let mut candidates = Candidates::new();
        candidates.add_resolving(host);
        candidates.attach_fragment(host, frag);

        let mut sources = CapabilitySources::new();
        let s = sources.sources(&ctx, &candidates, CapabilityRef::Direct(own), &PackageMap::new());
        assert!(s.contains(&CapabilityRef::Wrapped {
            host,
            capability: contributed
        }));
        assert!(!s.contains(&CapabilityRef::Direct(contributed)));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn required_bundle_cycle_terminates() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", v1());
        let b = graph.add_bundle("b", v1());
        let ap = graph.export_package(a, "p", v1(), &[]);
        let bp = graph.export_package(b, "p", v1(), &[]);
        let a_req = graph.require_bundle(a, "b", true).unwrap();
        let b_req = graph.require_bundle(b, "a", true).unwrap();
        let ctx = TestContext { graph, wirings: Wirings::new() };

        let mut packages = PackageMap::new();
        let mut a_pkgs = Packages::default();
        a_pkgs.required.insert("p".into(), vec![Blame::new(CapabilityRef::Direct(bp), vec![a_req])]);
        let mut b_pkgs = Packages::default();
        b_pkgs.required.insert("p".into(), vec![Blame::new(CapabilityRef::Direct(ap), vec![b_req])]);
        packages.insert(a, a_pkgs);
        packages.insert(b, b_pkgs);

        let mut sources = CapabilitySources::new();
        let s = sources.sources(&ctx, &Candidates::new(), CapabilityRef::Direct(ap), &packages);
        assert_eq!(
            s,
            &HashSet::from([CapabilityRef::Direct(ap), CapabilityRef::Direct(bp)])
        );
    }

    #[test]
    fn clearing_the_cache_picks_up_new_wirings() {
        let mut graph = ResourceGraph::new();
        let host = graph.add_bundle("host", v1());
        let own = graph.export_package(host, "p", v1(), &[]);
        let frag = graph.add_fragment("frag", v1(), "host").unwrap();
        let contributed = graph.export_package(frag, "p", v1(), &[]);

        let mut wirings = Wirings::new();
        wirings.insert(host, Wiring::for_resource(&graph, host));
        let mut ctx = TestContext { graph, wirings };

        let mut sources = CapabilitySources::new();
        let candidates = Candidates::new();
        let packages = PackageMap::new();
        let before = sources
            .sources(&ctx, &candidates, CapabilityRef::Direct(own), &packages)
            .clone();
        assert_eq!(before.len(), 1);

        // The fragment gets attached by a later resolve.
        if let Some(wiring) = ctx.wirings.get_mut(&host) {
            wiring.capabilities.push(contributed);
        }
        let stale = sources.sources(&ctx, &candidates, CapabilityRef::Direct(own), &packages);
        assert_eq!(stale, &before);

        sources.clear();
        let fresh = sources.sources(&ctx, &candidates, CapabilityRef::Direct(own), &packages);
        assert_eq!(fresh.len(), 2);
        assert_ne!(fresh, &before);
    }
}
