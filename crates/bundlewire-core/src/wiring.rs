//! Resolution state of resources that were wired by an earlier resolve.

use std::collections::BTreeMap;

use crate::model::{CapabilityId, CapabilityRef, RequirementId, ResourceGraph, ResourceId};

/// A resolved requirement -> capability edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    pub requirement: RequirementId,
    pub capability: CapabilityRef,
}

impl Wire {
    /// The resource providing the capability (the host for fragment capabilities).
    pub fn provider(&self, graph: &ResourceGraph) -> ResourceId {
        self.capability.resource(graph)
    }
}

/// Immutable resolution state of one resource.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    /// Capabilities visible through the resource, including those of attached fragments.
    pub capabilities: Vec<CapabilityId>,
    /// Requirements of the resource and its attached fragments.
    pub requirements: Vec<RequirementId>,
    pub wires: Vec<Wire>,
}

impl Wiring {
    /// A wiring with the resource's own capabilities and requirements and no wires.
    pub fn for_resource(graph: &ResourceGraph, resource: ResourceId) -> Self {
        let r = graph.resource(resource);
        Self {
            capabilities: r.capabilities.clone(),
            requirements: r.requirements.clone(),
            wires: Vec::new(),
        }
    }

    /// The first wire recorded for `requirement`.
    pub fn wire_for(&self, requirement: RequirementId) -> Option<&Wire> {
        self.wires.iter().find(|w| w.requirement == requirement)
    }

    /// All wires recorded for `requirement` (several for multiple cardinality).
    pub fn wires_for(&self, requirement: RequirementId) -> impl Iterator<Item = &Wire> {
        self.wires.iter().filter(move |w| w.requirement == requirement)
    }
}

/// Already-resolved resources and their wirings.
pub type Wirings = BTreeMap<ResourceId, Wiring>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    #[test]
    fn wire_lookup_by_requirement() {
        let mut graph = ResourceGraph::new();
        let a = graph.add_bundle("a", Version::new(1, 0, 0));
        let b = graph.add_bundle("b", Version::new(1, 0, 0));
        let p = graph.export_package(b, "p", Version::new(1, 0, 0), &[]);
        let req = graph.import_package(a, "p", None).unwrap();

        let mut wiring = Wiring::for_resource(&graph, a);
        assert!(wiring.wire_for(req).is_none());
        wiring.wires.push(Wire {
            requirement: req,
            capability: CapabilityRef::Direct(p),
        });

        let wire = wiring.wire_for(req).unwrap();
        assert_eq!(wire.provider(&graph), b);
        assert_eq!(wiring.wires_for(req).count(), 1);
        assert_eq!(wiring.requirements, vec![req]);
    }
}
