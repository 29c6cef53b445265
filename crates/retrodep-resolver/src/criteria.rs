//! Per-identifier bookkeeping and the engine's state snapshots.

use hashbrown::{HashMap, HashSet};

use retrodep_types::{Candidate, NameId, NodeId, Requirement};

/// Everything the engine knows about one identifier.
///
/// `information` collects every requirement that has demanded the
/// identifier so far; `incompatibilities` are node ids already known to
/// fail in the current search branch. Both grow monotonically within a
/// branch and are inherited wholesale when a new state is pushed.
#[derive(Debug, Clone, Default)]
pub struct Criterion {
    pub information: Vec<Requirement>,
    pub incompatibilities: HashSet<NodeId>,
}

/// One snapshot on the engine's state stack.
///
/// `mapping` preserves pin order: the last entry is the most recent pin,
/// which is exactly what backjumping removes first.
#[derive(Debug, Clone, Default)]
pub struct ResolutionState {
    pub mapping: Vec<(NameId, Candidate)>,
    pub criteria: HashMap<NameId, Criterion>,
    pub backtrack_causes: Vec<Requirement>,
}

impl ResolutionState {
    /// The pinned candidate for `name`, if any.
    #[must_use]
    pub fn pinned(&self, name: NameId) -> Option<Candidate> {
        self.mapping
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
    }

    /// Remove and return the most recent pin.
    pub fn pop_last_pin(&mut self) -> Option<(NameId, Candidate)> {
        self.mapping.pop()
    }

    /// Identifiers demanded but not yet pinned, ascending by id so every
    /// downstream ordering decision is deterministic.
    #[must_use]
    pub fn unsatisfied(&self) -> Vec<NameId> {
        let mut names: Vec<NameId> = self
            .criteria
            .iter()
            .filter(|(name, criterion)| {
                !criterion.information.is_empty() && self.pinned(**name).is_none()
            })
            .map(|(name, _)| *name)
            .collect();
        names.sort_unstable();
        names
    }
}
