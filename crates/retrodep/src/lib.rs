//! Time-aware, root-pinned dependency resolution.
//!
//! Given a start package-version, a pinned root version, and a time
//! cutoff, decide whether a consistent assignment of dependencies exists
//! such that exactly one version is chosen per package name, every chosen
//! version predates the cutoff, at least one interpreter bit is shared by
//! all of them, and wherever the root's package name is demanded only the
//! pinned root version is admissible.
//!
//! ```no_run
//! use retrodep::{Context, ResolveRequest, Runner, SqliteStore};
//! use retrodep::{Epoch, NameId, NodeId};
//!
//! # fn main() -> retrodep::Result<()> {
//! let store = SqliteStore::open("graph.db")?;
//! let ctx = Context::load(Box::new(store), retrodep::DEFAULT_CHUNK_CACHE_CAPACITY)?;
//! let runner = Runner::new(&ctx);
//! let res = runner.resolve(
//!     &ResolveRequest::new(NodeId::new(42), NodeId::new(7), NameId::new(3), Epoch::new(1_600_000_000))
//!         .with_debug(true),
//! )?;
//! println!("resolved={} depth={}", res.resolved, res.depth);
//! # Ok(())
//! # }
//! ```

mod runner;

pub use runner::{DebugTree, Resolution, ResolveRequest, Runner};

pub use retrodep_error::{Result, RetroError};
pub use retrodep_graph::{Context, NewestFirstCursor, DEFAULT_CHUNK_CACHE_CAPACITY};
pub use retrodep_resolver::{Engine, Outcome, Provider, DEFAULT_MAX_ROUNDS};
pub use retrodep_store::{GraphStore, MemStore, SqliteStore};
pub use retrodep_types::{
    Candidate, Epoch, InterpreterMask, NameId, NodeId, Requirement, INTERPRETER_VERSIONS,
};
