//! The resolver's view of the outside world.

use std::cmp::Ordering;

use bundlewire_core::manifest::Repository;
use bundlewire_core::model::{
    AttrValue, CapabilityId, RequirementId, ResourceGraph, ResourceId, BUNDLE_VERSION_ATTRIBUTE,
    VERSION_ATTRIBUTE,
};
use bundlewire_core::version::Version;
use bundlewire_core::wiring::{Wire, Wirings};

/// Everything a resolve needs from its caller: the resource arena, the
/// wirings of already-resolved resources and a provider index.
pub trait ResolveContext {
    fn graph(&self) -> &ResourceGraph;

    /// Resources resolved by an earlier resolve. Their wirings are never re-decided.
    fn wirings(&self) -> &Wirings;

    /// Resources that must resolve.
    fn mandatory_resources(&self) -> Vec<ResourceId>;

    /// Resources to resolve when possible.
    fn optional_resources(&self) -> Vec<ResourceId> {
        Vec::new()
    }

    /// Capabilities able to satisfy `requirement`, most preferred first.
    fn find_providers(&self, requirement: RequirementId) -> Vec<CapabilityId>;

    fn is_wired(&self, resource: ResourceId) -> bool {
        self.wirings().contains_key(&resource)
    }

    /// The wire recorded for `requirement` by an earlier resolve.
    fn wire_for(&self, requirement: RequirementId) -> Option<Wire> {
        let owner = self.graph().requirement(requirement).resource;
        if let Some(wire) = self.wirings().get(&owner).and_then(|w| w.wire_for(requirement)) {
            return Some(*wire);
        }
        // Fragment requirements are wired through their host.
        self.wirings()
            .values()
            .find_map(|w| w.wire_for(requirement).copied())
    }
}

/// A [`ResolveContext`] over a loaded [`Repository`].
///
/// Providers are ordered with already-wired resources first, then by
/// descending capability version, then by declaration order.
pub struct RepositoryContext<'a> {
    repo: &'a Repository,
}

impl<'a> RepositoryContext<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }
}

impl ResolveContext for RepositoryContext<'_> {
    fn graph(&self) -> &ResourceGraph {
        &self.repo.graph
    }

    fn wirings(&self) -> &Wirings {
        &self.repo.wirings
    }

    fn mandatory_resources(&self) -> Vec<ResourceId> {
        self.repo.roots.clone()
    }

    fn optional_resources(&self) -> Vec<ResourceId> {
        self.repo.optional_roots.clone()
    }

    fn find_providers(&self, requirement: RequirementId) -> Vec<CapabilityId> {
        let graph = &self.repo.graph;
        let req = graph.requirement(requirement);
        let mut providers: Vec<CapabilityId> = graph
            .capabilities()
            .filter(|cap| req.matches(cap))
            .map(|cap| cap.id)
            .collect();
        providers.sort_by(|a, b| self.compare_providers(*a, *b));
        providers
    }
}

impl RepositoryContext<'_> {
    fn compare_providers(&self, a: CapabilityId, b: CapabilityId) -> Ordering {
        let graph = &self.repo.graph;
        let wired = |c: CapabilityId| self.is_wired(graph.capability(c).resource);
        wired(b)
            .cmp(&wired(a))
            .then_with(|| capability_version(graph, b).cmp(&capability_version(graph, a)))
            .then_with(|| a.cmp(&b))
    }
}

/// The version a capability advertises, falling back to its resource's version.
pub fn capability_version(graph: &ResourceGraph, capability: CapabilityId) -> Version {
    let cap = graph.capability(capability);
    [VERSION_ATTRIBUTE, BUNDLE_VERSION_ATTRIBUTE]
        .iter()
        .find_map(|key| match cap.attributes.get(*key) {
            Some(AttrValue::Version(v)) => Some(v.clone()),
            _ => None,
        })
        .unwrap_or_else(|| graph.resource(cap.resource).version.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlewire_core::manifest::Manifest;

    fn repository(toml: &str) -> Repository {
        Manifest::from_str(toml).unwrap().into_repository().unwrap()
    }

    #[test]
    fn providers_prefer_wired_then_highest_version() {
        let repo = repository(
            r#"
roots = ["app"]

[[resource]]
name = "old"
version = "1.0"
resolved = true
[[resource.export]]
package = "p"
version = "1.0"

[[resource]]
name = "new"
version = "2.0"
[[resource.export]]
package = "p"
version = "2.0"

[[resource]]
name = "newer"
version = "3.0"
[[resource.export]]
package = "p"
version = "3.0"

[[resource]]
name = "app"
[[resource.import]]
package = "p"
"#,
        );
        let ctx = RepositoryContext::new(&repo);
        let graph = ctx.graph();
        let app = graph.find_resource("app", None).unwrap();
        let req = graph.resource(app).requirements[0];
        let names: Vec<&str> = ctx
            .find_providers(req)
            .into_iter()
            .map(|c| graph.resource(graph.capability(c).resource).symbolic_name.as_str())
            .collect();
        assert_eq!(names, vec!["old", "newer", "new"]);
        assert_eq!(ctx.mandatory_resources(), vec![app]);
    }

    #[test]
    fn wire_for_finds_recorded_wire() {
        let repo = repository(
            r#"
[[resource]]
name = "lib"
resolved = true
[[resource.export]]
package = "p"

[[resource]]
name = "user"
resolved = true
[[resource.import]]
package = "p"
[[resource.wire]]
package = "p"
provider = "lib"
"#,
        );
        let ctx = RepositoryContext::new(&repo);
        let graph = ctx.graph();
        let user = graph.find_resource("user", None).unwrap();
        let lib = graph.find_resource("lib", None).unwrap();
        let req = graph.resource(user).requirements[0];
        let wire = ctx.wire_for(req).unwrap();
        assert_eq!(wire.provider(graph), lib);
        assert!(ctx.is_wired(user));
        assert!(ctx.mandatory_resources().is_empty());
    }
}
