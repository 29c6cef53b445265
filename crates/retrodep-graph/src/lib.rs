//! Preloaded package-version graph and its time-bounded readers.
//!
//! [`Context`] is built once at process start: dense per-node arrays, the
//! per-node direct-dependency lists, per-(src, dep-name) chunk headers, and
//! a shared LRU over chunk bodies fetched on demand. Everything but the LRU
//! is read-only after construction, so any number of concurrent resolutions
//! may share one context.
//!
//! [`NewestFirstCursor`] streams admissible destinations for one edge group
//! newest-first under a cutoff; [`Context::edge_exists_upto`] answers point
//! membership probes. Both lean on the time-monotonic chunk layout: two
//! binary searches bound the work before any body is touched.

mod context;
mod cursor;

pub use context::{Context, NodeMeta, DEFAULT_CHUNK_CACHE_CAPACITY};
pub use cursor::NewestFirstCursor;
