//! Backtracking dependency resolution over the preloaded graph.
//!
//! One resolution call wires together a [`Provider`] (bound to a start
//! node, a pinned root, and a time cutoff) and an [`Engine`] (the state
//! stack, the round loop, and backjumping). Conflicts are values, never
//! unwinds: the engine returns an [`Outcome`], and only data-layer
//! failures surface as errors.

mod criteria;
mod engine;
mod provider;

pub use criteria::{Criterion, ResolutionState};
pub use engine::{Engine, Outcome, DEFAULT_MAX_ROUNDS};
pub use provider::{MatchStream, Provider};
