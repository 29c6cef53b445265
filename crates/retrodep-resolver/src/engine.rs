//! The backtracking round loop.
//!
//! The engine owns a stack of [`ResolutionState`] snapshots. Each round
//! pins one identifier by pushing a tentative state and trying candidates
//! in order; a round with no workable candidate extracts its backtrack
//! causes and backjumps, discarding states and folding their accumulated
//! incompatibilities into a retry state. All conflict flow is by value —
//! the only `Err` paths are data-layer failures.

use hashbrown::HashMap;
use tracing::{debug, trace};

use retrodep_error::Result;
use retrodep_types::{Candidate, NameId, NodeId, Requirement};

use crate::criteria::{Criterion, ResolutionState};
use crate::provider::Provider;

/// Default bound on resolution rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 100;

/// Terminal result of one resolution call.
#[derive(Debug)]
pub enum Outcome {
    /// Every demanded identifier is pinned; the final state carries the
    /// mapping and the criteria that produced it.
    Success(ResolutionState),
    /// No satisfying assignment exists under this provider.
    Unresolvable { causes: Vec<Requirement> },
    /// The round limit was exhausted before the search settled.
    RoundLimit,
}

pub struct Engine<'a, 'p> {
    provider: &'p mut Provider<'a>,
    states: Vec<ResolutionState>,
    max_rounds: usize,
}

impl<'a, 'p> Engine<'a, 'p> {
    pub fn new(provider: &'p mut Provider<'a>, max_rounds: usize) -> Self {
        Self {
            provider,
            states: Vec::new(),
            max_rounds,
        }
    }

    /// Run the search seeded with `root_requirement`.
    pub fn resolve(mut self, root_requirement: Requirement) -> Result<Outcome> {
        let mut initial = ResolutionState::default();
        initial
            .criteria
            .entry(Provider::identify(&root_requirement))
            .or_default()
            .information
            .push(root_requirement);
        self.states.push(initial);

        for round in 0..self.max_rounds {
            let state = self.states.last().expect("stack is never empty");
            let unsatisfied = state.unsatisfied();
            if unsatisfied.is_empty() {
                debug!(round, pins = state.mapping.len(), "resolution settled");
                return Ok(Outcome::Success(self.states.pop().expect("top state")));
            }

            let target = self.select(&unsatisfied)?;
            debug!(round, name = %target, "pinning identifier");

            if !self.attempt_pin(target)? {
                let causes = self.extract_causes(target);
                debug!(round, name = %target, causes = causes.len(), "round conflict");
                if !self.backjump(&causes)? {
                    return Ok(Outcome::Unresolvable { causes });
                }
            }
        }

        debug!(max_rounds = self.max_rounds, "round limit exhausted");
        Ok(Outcome::RoundLimit)
    }

    /// Choose the identifier with the smallest preference key.
    fn select(&mut self, unsatisfied: &[NameId]) -> Result<NameId> {
        let state = self.states.last().expect("stack is never empty");
        let mut best: Option<((u8, usize, NameId), NameId)> = None;
        for &name in unsatisfied {
            let criterion = &state.criteria[&name];
            let key = self.provider.preference(
                name,
                &criterion.information,
                &criterion.incompatibilities,
                &state.backtrack_causes,
            )?;
            if best.as_ref().is_none_or(|(k, _)| key < *k) {
                best = Some((key, name));
            }
        }
        Ok(best.expect("unsatisfied is non-empty").1)
    }

    /// Build a tentative state and try candidates for `target` in order;
    /// the tentative state is committed with the first workable candidate.
    /// Returns false when every candidate conflicts — the tentative state
    /// is dropped then, because its per-candidate rejections were judged
    /// against the current mapping and do not hold once a pin is unwound.
    fn attempt_pin(&mut self, target: NameId) -> Result<bool> {
        let base = self.states.last().expect("stack is never empty");
        let mut tentative = base.clone();

        self.provider.set_state(&tentative.mapping)?;
        let criterion = &tentative.criteria[&target];
        let mut matches = self.provider.find_matches(
            target,
            &criterion.information,
            &criterion.incompatibilities,
        )?;

        while let Some(candidate) = matches.next()? {
            if Self::try_candidate(self.provider, &mut tentative, target, candidate)? {
                debug!(name = %target, node = %candidate.node, "pinned");
                self.states.push(tentative);
                return Ok(true);
            }
            trace!(name = %target, node = %candidate.node, "candidate conflicts, marking incompatible");
            let _ = tentative
                .criteria
                .entry(target)
                .or_default()
                .incompatibilities
                .insert(candidate.node);
        }
        Ok(false)
    }

    /// Tentatively pin `candidate`, fanning out its dependencies and
    /// re-validating every already-pinned identifier a new requirement
    /// touches. On conflict the added information is rolled back.
    fn try_candidate(
        provider: &Provider<'a>,
        state: &mut ResolutionState,
        target: NameId,
        candidate: Candidate,
    ) -> Result<bool> {
        let requirements = provider.get_dependencies(candidate)?;

        let mut added: Vec<NameId> = Vec::with_capacity(requirements.len());
        let mut ok = true;
        for requirement in &requirements {
            state
                .criteria
                .entry(requirement.name)
                .or_default()
                .information
                .push(*requirement);
            added.push(requirement.name);

            if let Some(pinned) = state.pinned(requirement.name) {
                if !provider.is_satisfied_by(*requirement, pinned)? {
                    trace!(
                        name = %requirement.name,
                        pinned = %pinned.node,
                        "new requirement invalidates a pinned candidate"
                    );
                    ok = false;
                    break;
                }
            }
        }

        if !ok {
            for name in added.into_iter().rev() {
                let criterion = state
                    .criteria
                    .get_mut(&name)
                    .expect("criterion was just touched");
                let _ = criterion.information.pop();
                if criterion.information.is_empty() && criterion.incompatibilities.is_empty() {
                    let _ = state.criteria.remove(&name);
                }
            }
            return Ok(false);
        }

        state.mapping.push((target, candidate));
        Ok(true)
    }

    /// Requirements whose parented demands could not be jointly met.
    fn extract_causes(&self, target: NameId) -> Vec<Requirement> {
        self.states
            .last()
            .and_then(|state| state.criteria.get(&target))
            .map(|criterion| {
                criterion
                    .information
                    .iter()
                    .filter(|req| req.parent.is_some())
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Unwind to the most recent point where a different pin can be tried.
    ///
    /// Pops the state whose last pin caused the conflict, folds its
    /// accumulated incompatibilities plus the culprit pin itself onto a
    /// clone of the still-earlier state, and pushes that clone as the
    /// retry state. The clone predates the culprit's pin, so none of the
    /// culprit's dependency demands survive into the retry. Returns false
    /// when nothing is left to retry.
    fn backjump(&mut self, causes: &[Requirement]) -> Result<bool> {
        if self.states.len() < 2 {
            return Ok(false);
        }
        let mut broken = self.states.pop().expect("stack has at least two states");
        let Some((culprit_name, culprit)) = broken.pop_last_pin() else {
            return Ok(false);
        };
        debug!(name = %culprit_name, node = %culprit.node, "backjumping over pin");

        // The broken state's incompatibilities were all discovered before
        // its pin was placed, so they remain valid in the retry branch.
        let mut patch: HashMap<NameId, Vec<NodeId>> = HashMap::new();
        for (name, criterion) in &broken.criteria {
            if !criterion.incompatibilities.is_empty() {
                patch
                    .entry(*name)
                    .or_default()
                    .extend(criterion.incompatibilities.iter().copied());
            }
        }
        patch.entry(culprit_name).or_default().push(culprit.node);

        let mut retry = self
            .states
            .last()
            .expect("stack is non-empty after the pop")
            .clone();
        for (name, nodes) in patch {
            let criterion = retry.criteria.entry(name).or_insert_with(Criterion::default);
            criterion.incompatibilities.extend(nodes);
        }
        retry.backtrack_causes = causes.to_vec();
        self.states.push(retry);
        Ok(true)
    }
}
