//! Read-only access to the preprocessed package-version graph.
//!
//! The rest of the workspace never talks to a database directly; it
//! consumes [`GraphStore`]. The bulk loaders run once at context
//! construction, `fetch_chunk` runs on every chunk-cache miss.

mod mem;
mod sqlite;

pub use mem::MemStore;
pub use sqlite::SqliteStore;

use retrodep_error::Result;
use retrodep_types::{DepsRow, HeaderRow, NameId, NodeId, NodeRow};

/// Read interface over the preprocessed graph collections.
///
/// Implementations must be safe to share across threads: concurrent
/// resolutions over one context fetch chunks through the same handle.
pub trait GraphStore: Send + Sync {
    /// Every package-version row. Consumed once at preload.
    fn load_nodes(&self) -> Result<Vec<NodeRow>>;

    /// Package name strings keyed by name id. Diagnostic only; the
    /// resolver never consults strings.
    fn load_names(&self) -> Result<Vec<(NameId, String)>>;

    /// Direct-dependency lists. A node absent here has zero dependencies.
    fn load_deps(&self) -> Result<Vec<DepsRow>>;

    /// Chunk headers for every `(src, dep-name)` edge group.
    fn load_headers(&self) -> Result<Vec<HeaderRow>>;

    /// One chunk body, in ascending first-upload order.
    ///
    /// `Ok(None)` means the store has no such chunk; the caller decides
    /// whether that is fatal (it is, whenever a header promised the chunk).
    fn fetch_chunk(&self, src: NodeId, dep: NameId, chunk: usize) -> Result<Option<Vec<NodeId>>>;
}

impl<S: GraphStore + ?Sized> GraphStore for std::sync::Arc<S> {
    fn load_nodes(&self) -> Result<Vec<NodeRow>> {
        (**self).load_nodes()
    }

    fn load_names(&self) -> Result<Vec<(NameId, String)>> {
        (**self).load_names()
    }

    fn load_deps(&self) -> Result<Vec<DepsRow>> {
        (**self).load_deps()
    }

    fn load_headers(&self) -> Result<Vec<HeaderRow>> {
        (**self).load_headers()
    }

    fn fetch_chunk(&self, src: NodeId, dep: NameId, chunk: usize) -> Result<Option<Vec<NodeId>>> {
        (**self).fetch_chunk(src, dep, chunk)
    }
}
