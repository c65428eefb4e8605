//! State owned by one resolve: permutation queues, the multiplicity
//! snapshot and the package source cache.

use std::cell::OnceCell;
use std::collections::{HashSet, VecDeque};

use bundlewire_core::model::{CapabilityRef, RequirementId};

use crate::candidates::Candidates;
use crate::context::ResolveContext;
use crate::sources::CapabilitySources;

pub struct ResolveSession<'a> {
    ctx: &'a dyn ResolveContext,
    uses_permutations: VecDeque<Candidates>,
    import_permutations: VecDeque<Candidates>,
    /// Copy of the permutation under check with offending candidates of
    /// multiple-cardinality requirements removed. Set at most once per attempt.
    multiple_card_candidates: OnceCell<Candidates>,
    sources: CapabilitySources,
}

impl<'a> ResolveSession<'a> {
    pub fn new(ctx: &'a dyn ResolveContext) -> Self {
        Self {
            ctx,
            uses_permutations: VecDeque::new(),
            import_permutations: VecDeque::new(),
            multiple_card_candidates: OnceCell::new(),
            sources: CapabilitySources::new(),
        }
    }

    pub fn context(&self) -> &'a dyn ResolveContext {
        self.ctx
    }

    pub fn uses_permutations(&self) -> &VecDeque<Candidates> {
        &self.uses_permutations
    }

    pub fn uses_permutations_mut(&mut self) -> &mut VecDeque<Candidates> {
        &mut self.uses_permutations
    }

    pub fn import_permutations(&self) -> &VecDeque<Candidates> {
        &self.import_permutations
    }

    pub fn import_permutations_mut(&mut self) -> &mut VecDeque<Candidates> {
        &mut self.import_permutations
    }

    /// Permutations waiting in both queues.
    pub fn permutation_count(&self) -> usize {
        self.uses_permutations.len() + self.import_permutations.len()
    }

    /// The next permutation to try; uses permutations go first.
    pub fn next_permutation(&mut self) -> Option<Candidates> {
        self.uses_permutations
            .pop_front()
            .or_else(|| self.import_permutations.pop_front())
    }

    /// Remove `causes` from `requirement` in the multiplicity snapshot,
    /// taking the snapshot from `current` if this attempt has none yet.
    /// Returns the candidates left for `requirement`.
    pub fn clear_multiple_candidates(
        &mut self,
        current: &Candidates,
        requirement: RequirementId,
        causes: &HashSet<CapabilityRef>,
    ) -> Vec<CapabilityRef> {
        self.multiple_card_candidates.get_or_init(|| current.copy());
        self.multiple_card_candidates
            .get_mut()
            .map(|snapshot| snapshot.clear_candidates(requirement, causes))
            .unwrap_or_default()
    }

    pub fn multiple_card_candidates(&self) -> Option<&Candidates> {
        self.multiple_card_candidates.get()
    }

    /// Forget per-attempt state: hands back the multiplicity snapshot, if
    /// any, and empties the source cache.
    pub fn reset_attempt(&mut self) -> Option<Candidates> {
        self.sources.clear();
        self.multiple_card_candidates.take()
    }

    pub fn sources(&self) -> &CapabilitySources {
        &self.sources
    }

    pub fn sources_mut(&mut self) -> &mut CapabilitySources {
        &mut self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundlewire_core::model::{CapabilityId, ResourceGraph, ResourceId};
    use bundlewire_core::wiring::Wirings;

    struct Empty {
        graph: ResourceGraph,
        wirings: Wirings,
    }

    impl ResolveContext for Empty {
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

    fn cap(n: usize) -> CapabilityRef {
        CapabilityRef::Direct(CapabilityId(n))
    }

    #[test]
    fn uses_queue_is_drained_first() {
        let ctx = Empty {
            graph: ResourceGraph::new(),
            wirings: Wirings::new(),
        };
        let mut session = ResolveSession::new(&ctx);
        let mut import = Candidates::new();
        import.insert(RequirementId(0), vec![cap(0)], false, false);
        let mut uses = Candidates::new();
        uses.insert(RequirementId(0), vec![cap(1)], false, false);

        session.import_permutations_mut().push_back(import.clone());
        session.uses_permutations_mut().push_back(uses.clone());
        assert_eq!(session.permutation_count(), 2);

        assert_eq!(session.next_permutation(), Some(uses));
        assert_eq!(session.next_permutation(), Some(import));
        assert_eq!(session.next_permutation(), None);
    }

    #[test]
    fn multiplicity_snapshot_is_taken_once() {
        let ctx = Empty {
            graph: ResourceGraph::new(),
            wirings: Wirings::new(),
        };
        let mut session = ResolveSession::new(&ctx);
        let mut first = Candidates::new();
        first.insert(RequirementId(0), vec![cap(1), cap(2), cap(3)], false, true);
        let mut second = Candidates::new();
        second.insert(RequirementId(0), vec![cap(7)], false, true);

        let left = session.clear_multiple_candidates(&first, RequirementId(0), &HashSet::from([cap(1)]));
        assert_eq!(left, vec![cap(2), cap(3)]);

        // The first caller's copy is kept; `second` is ignored.
        let left = session.clear_multiple_candidates(&second, RequirementId(0), &HashSet::from([cap(2)]));
        assert_eq!(left, vec![cap(3)]);
        assert_eq!(first.candidates(RequirementId(0)).map(<[_]>::len), Some(3));

        let snapshot = session.reset_attempt().unwrap();
        assert_eq!(snapshot.first_candidate(RequirementId(0)), Some(cap(3)));
        assert!(session.multiple_card_candidates().is_none());
    }
}
