//! The resolver-facing view of one resolution call.
//!
//! A provider is constructed per call and carries the call's whole
//! configuration: start node, pinned root, cutoff, and the live
//! interpreter mask snapshot the engine refreshes before every
//! `find_matches`. Candidates are streamed out of chunk cursors; the full
//! universe of an identifier is never materialized.

use hashbrown::HashSet;
use smallvec::SmallVec;
use tracing::trace;

use retrodep_error::{Result, RetroError};
use retrodep_graph::{Context, NewestFirstCursor};
use retrodep_types::{Candidate, Epoch, InterpreterMask, NameId, NodeId, Requirement};

pub struct Provider<'a> {
    ctx: &'a Context,
    start_node: NodeId,
    start_name: NameId,
    root_node: NodeId,
    root_name: NameId,
    cutoff: Epoch,
    /// AND of the interpreter masks of every pinned candidate, refreshed
    /// via [`Provider::set_state`] immediately before each `find_matches`.
    live_mask: InterpreterMask,
}

impl<'a> Provider<'a> {
    pub fn new(
        ctx: &'a Context,
        start_node: NodeId,
        root_node: NodeId,
        root_name: NameId,
        cutoff: Epoch,
    ) -> Result<Self> {
        let start_name = ctx.node(start_node)?.name;
        // The root must at least be a known node; whether it is admissible
        // at this cutoff is decided per find_matches.
        let _ = ctx.node(root_node)?;
        Ok(Self {
            ctx,
            start_node,
            start_name,
            root_node,
            root_name,
            cutoff,
            live_mask: InterpreterMask::UNCONSTRAINED,
        })
    }

    #[inline]
    #[must_use]
    pub fn start_name(&self) -> NameId {
        self.start_name
    }

    #[inline]
    #[must_use]
    pub fn cutoff(&self) -> Epoch {
        self.cutoff
    }

    /// The identifier of a requirement or candidate.
    #[inline]
    #[must_use]
    pub fn identify(requirement: &Requirement) -> NameId {
        requirement.name
    }

    /// State hook: absorb the engine's current pinned mapping.
    ///
    /// One-way notification; the provider only distills the mapping into
    /// the live interpreter mask used by subsequent candidate filtering.
    pub fn set_state(&mut self, mapping: &[(NameId, Candidate)]) -> Result<()> {
        let mut mask = InterpreterMask::UNCONSTRAINED;
        for (_, candidate) in mapping {
            mask = mask.intersect(self.ctx.node(candidate.node)?.py_mask);
        }
        self.live_mask = mask;
        Ok(())
    }

    /// Preference key for choosing the next identifier to pin: conflict
    /// causes first, then fewer remaining candidates, then the identifier
    /// itself as the total-order tie break. Smaller is preferred.
    pub fn preference(
        &self,
        name: NameId,
        information: &[Requirement],
        incompatibilities: &HashSet<NodeId>,
        backtrack_causes: &[Requirement],
    ) -> Result<(u8, usize, NameId)> {
        let in_causes = backtrack_causes.iter().any(|req| req.name == name);
        let count = self.candidate_count_bound(name, information, incompatibilities)?;
        Ok((u8::from(!in_causes), count, name))
    }

    /// Cheap upper bound on the candidates left for `name`: singleton
    /// universes are 1, otherwise the smallest parent cursor's length.
    /// The exact count would need a full filtered walk; the bound is
    /// deterministic, which is all the preference order requires.
    fn candidate_count_bound(
        &self,
        name: NameId,
        information: &[Requirement],
        incompatibilities: &HashSet<NodeId>,
    ) -> Result<usize> {
        if information.iter().any(|req| req.parent.is_none()) || name == self.root_name {
            let only = if name == self.root_name && !information.iter().any(|r| r.parent.is_none())
            {
                self.root_node
            } else {
                self.start_node
            };
            return Ok(usize::from(!incompatibilities.contains(&only)));
        }
        let mut best = usize::MAX;
        for parent in information.iter().filter_map(|req| req.parent) {
            let cursor = NewestFirstCursor::open(
                self.ctx,
                parent.node,
                name,
                self.cutoff,
                Some((self.root_name, self.root_node)),
            )?;
            best = best.min(cursor.remaining());
            if best == 0 {
                break;
            }
        }
        Ok(if best == usize::MAX { 0 } else { best })
    }

    /// Whether `candidate` satisfies `requirement` at this call's cutoff.
    pub fn is_satisfied_by(&self, requirement: Requirement, candidate: Candidate) -> Result<bool> {
        if requirement.name != candidate.name {
            return Ok(false);
        }
        if self.ctx.upload_time(candidate.node)? > self.cutoff {
            return Ok(false);
        }
        if requirement.name == self.root_name && candidate.node != self.root_node {
            return Ok(false);
        }
        if let Some(parent) = requirement.parent {
            return self
                .ctx
                .edge_exists_upto(parent.node, requirement.name, candidate.node, self.cutoff);
        }
        Ok(true)
    }

    /// Requirements introduced by pinning `candidate`, in the stored
    /// adjacency order.
    pub fn get_dependencies(
        &self,
        candidate: Candidate,
    ) -> Result<SmallVec<[Requirement; 8]>> {
        Ok(self
            .ctx
            .deps_of(candidate.node)?
            .iter()
            .map(|&dep| Requirement::from_parent(dep, candidate))
            .collect())
    }

    /// Admissible candidates for `name`, newest-first.
    ///
    /// The universe depends on where the demand came from: the parentless
    /// seed requirement restricts it to the start node, the pinned root's
    /// name restricts it to the root node, and every other identifier is
    /// the intersection of its parents' destination sets. The smallest
    /// parent is streamed; the others answer membership probes.
    pub fn find_matches(
        &self,
        name: NameId,
        information: &[Requirement],
        incompatibilities: &HashSet<NodeId>,
    ) -> Result<MatchStream<'a>> {
        let is_seed = information.iter().any(|req| req.parent.is_none());

        let kind = if is_seed {
            StreamKind::Fixed(Some(self.start_node))
        } else if name == self.root_name {
            StreamKind::Fixed(Some(self.root_node))
        } else {
            let parents: SmallVec<[Candidate; 8]> =
                information.iter().filter_map(|req| req.parent).collect();
            if parents.is_empty() {
                return Err(RetroError::internal(format!(
                    "find_matches for {name} with no demands"
                )));
            }

            // Pick the parent with the fewest admissible destinations to
            // drive the stream; intersection preserves its descending
            // time order.
            let mut driver: Option<(usize, NewestFirstCursor<'a>)> = None;
            for (idx, parent) in parents.iter().enumerate() {
                let cursor = NewestFirstCursor::open(
                    self.ctx,
                    parent.node,
                    name,
                    self.cutoff,
                    Some((self.root_name, self.root_node)),
                )?;
                let smaller = driver
                    .as_ref()
                    .is_none_or(|(_, best)| cursor.remaining() < best.remaining());
                if smaller {
                    driver = Some((idx, cursor));
                }
            }
            let (driver_idx, cursor) = driver.expect("parents is non-empty");
            let probes: SmallVec<[NodeId; 8]> = parents
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != driver_idx)
                .map(|(_, parent)| parent.node)
                .collect();
            StreamKind::Streamed { cursor, probes }
        };

        Ok(MatchStream {
            ctx: self.ctx,
            name,
            cutoff: self.cutoff,
            live_mask: self.live_mask,
            root_name: self.root_name,
            root_node: self.root_node,
            incompatible: incompatibilities.clone(),
            kind,
        })
    }
}

enum StreamKind<'a> {
    /// Singleton universe (seed requirement or pinned root).
    Fixed(Option<NodeId>),
    /// Smallest parent streamed newest-first, other parents probed.
    Streamed {
        cursor: NewestFirstCursor<'a>,
        probes: SmallVec<[NodeId; 8]>,
    },
}

/// Lazy sequence of admissible candidates for one identifier.
pub struct MatchStream<'a> {
    ctx: &'a Context,
    name: NameId,
    cutoff: Epoch,
    live_mask: InterpreterMask,
    root_name: NameId,
    root_node: NodeId,
    incompatible: HashSet<NodeId>,
    kind: StreamKind<'a>,
}

impl MatchStream<'_> {
    /// Next admissible candidate, or `None` when the set is exhausted.
    pub fn next(&mut self) -> Result<Option<Candidate>> {
        loop {
            let node = match &mut self.kind {
                StreamKind::Fixed(slot) => slot.take(),
                StreamKind::Streamed { cursor, .. } => cursor.next()?,
            };
            let Some(node) = node else {
                return Ok(None);
            };
            if self.admit(node)? {
                return Ok(Some(Candidate::new(node, self.name)));
            }
        }
    }

    fn admit(&self, node: NodeId) -> Result<bool> {
        if self.incompatible.contains(&node) {
            trace!(%node, name = %self.name, "candidate rejected: known incompatibility");
            return Ok(false);
        }
        let meta = self.ctx.node(node)?;
        if meta.upload > self.cutoff {
            trace!(%node, name = %self.name, "candidate rejected: uploaded after cutoff");
            return Ok(false);
        }
        if !self.live_mask.intersects(meta.py_mask) {
            trace!(%node, name = %self.name, "candidate rejected: interpreter mask disjoint");
            return Ok(false);
        }
        if self.name == self.root_name && node != self.root_node {
            trace!(%node, name = %self.name, "candidate rejected: root pin");
            return Ok(false);
        }
        if let StreamKind::Streamed { probes, .. } = &self.kind {
            for &parent in probes {
                if !self.ctx.edge_exists_upto(parent, self.name, node, self.cutoff)? {
                    trace!(%node, %parent, "candidate rejected: absent from a parent's set");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}
