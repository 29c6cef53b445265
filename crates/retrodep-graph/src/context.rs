//! Context construction and the shared chunk cache.

use std::num::NonZeroUsize;

use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use retrodep_error::{Result, RetroError};
use retrodep_store::GraphStore;
use retrodep_types::{Epoch, HeaderRow, InterpreterMask, NameId, NodeId};

/// Default capacity of the chunk-body LRU.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 200_000;

/// Per-node facts read straight out of the preloaded arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMeta {
    pub name: NameId,
    pub upload: Epoch,
    pub py_mask: InterpreterMask,
}

type ChunkKey = (NodeId, NameId, usize);
type DepList = SmallVec<[NameId; 8]>;

/// The read-mostly heart of the system.
///
/// Only the chunk LRU mutates after [`Context::load`]; it sits behind a
/// mutex so concurrent resolutions can share one context. Chunk bodies are
/// cached without time truncation, so one cached entry serves every cutoff.
pub struct Context {
    store: Box<dyn GraphStore>,
    meta: Vec<Option<NodeMeta>>,
    deps: Vec<DepList>,
    names: Vec<String>,
    headers: HashMap<(NodeId, NameId), HeaderRow>,
    chunks: Mutex<LruCache<ChunkKey, Arc<Vec<NodeId>>>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("meta", &self.meta)
            .field("deps", &self.deps)
            .field("names", &self.names)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Bulk-preload the small tables and validate their shape.
    pub fn load(store: Box<dyn GraphStore>, cache_capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(cache_capacity)
            .ok_or_else(|| RetroError::corrupt("chunk cache capacity must be nonzero"))?;

        let node_rows = store.load_nodes()?;
        let max_node = node_rows.iter().map(|r| r.node.as_usize()).max();
        let len = max_node.map_or(0, |m| m + 1);

        let mut meta: Vec<Option<NodeMeta>> = vec![None; len];
        for row in &node_rows {
            let slot = &mut meta[row.node.as_usize()];
            if slot.is_some() {
                return Err(RetroError::corrupt(format!(
                    "duplicate node row for node {}",
                    row.node
                )));
            }
            *slot = Some(NodeMeta {
                name: row.name,
                upload: row.first_upload,
                py_mask: row.py_mask,
            });
        }

        // Missing from the deps table means zero dependencies; the dense
        // array makes that reading complete by construction.
        let mut deps: Vec<DepList> = vec![DepList::new(); len];
        for row in store.load_deps()? {
            let idx = row.node.as_usize();
            if idx >= len || meta[idx].is_none() {
                return Err(RetroError::corrupt(format!(
                    "deps row for unknown node {}",
                    row.node
                )));
            }
            deps[idx] = row.deps.into_iter().collect();
        }

        let mut names = Vec::new();
        for (name, text) in store.load_names()? {
            let idx = name.as_usize();
            if idx >= names.len() {
                names.resize(idx + 1, String::new());
            }
            names[idx] = text;
        }

        let mut headers = HashMap::new();
        for row in store.load_headers()? {
            if !row.is_well_formed() {
                return Err(RetroError::corrupt(format!(
                    "malformed header for src={} dep={}",
                    row.src, row.dep
                )));
            }
            if row.total == 0 {
                warn!(src = %row.src, dep = %row.dep, "empty header row");
            }
            if headers.insert((row.src, row.dep), row).is_some() {
                return Err(RetroError::corrupt("duplicate edge-group header"));
            }
        }

        debug!(
            nodes = node_rows.len(),
            headers = headers.len(),
            cache_capacity = capacity.get(),
            "graph context loaded"
        );

        Ok(Self {
            store,
            meta,
            deps,
            names,
            headers,
            chunks: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Per-node facts; `MissingNode` if `node` is outside the preload.
    #[inline]
    pub fn node(&self, node: NodeId) -> Result<NodeMeta> {
        self.meta
            .get(node.as_usize())
            .copied()
            .flatten()
            .ok_or(RetroError::MissingNode { node })
    }

    /// First-upload time of `node`.
    #[inline]
    pub fn upload_time(&self, node: NodeId) -> Result<Epoch> {
        Ok(self.node(node)?.upload)
    }

    /// Direct-dependency name ids of `node`, in insertion order.
    pub fn deps_of(&self, node: NodeId) -> Result<&[NameId]> {
        if self.meta.get(node.as_usize()).copied().flatten().is_none() {
            return Err(RetroError::MissingNode { node });
        }
        Ok(&self.deps[node.as_usize()])
    }

    /// Human-readable package name, if the store carried one.
    #[must_use]
    pub fn name_str(&self, name: NameId) -> Option<&str> {
        self.names
            .get(name.as_usize())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Chunk header for one `(src, dep-name)` edge group.
    #[must_use]
    pub fn header(&self, src: NodeId, dep: NameId) -> Option<&HeaderRow> {
        self.headers.get(&(src, dep))
    }

    /// One chunk body, through the LRU.
    ///
    /// The lock is held across a miss fetch so an entry is either wholly
    /// absent or wholly present; a chunk the headers promised but the store
    /// lacks is fatal.
    pub fn chunk_body(&self, src: NodeId, dep: NameId, chunk: usize) -> Result<Arc<Vec<NodeId>>> {
        let mut cache = self.chunks.lock();
        if let Some(body) = cache.get(&(src, dep, chunk)) {
            trace!(%src, %dep, chunk, "chunk cache hit");
            return Ok(Arc::clone(body));
        }

        trace!(%src, %dep, chunk, "chunk cache miss");
        let body = self
            .store
            .fetch_chunk(src, dep, chunk)?
            .ok_or(RetroError::MissingChunk { src, dep, chunk })?;
        let body = Arc::new(body);
        let _ = cache.push((src, dep, chunk), Arc::clone(&body));
        Ok(body)
    }

    /// Whether the preprocessed edge `(src, dep) -> dst` exists with `dst`
    /// admissible at `cutoff`.
    ///
    /// Cost is one header binary search plus one body probe; equal upload
    /// times may straddle a chunk boundary, so the probe walks every chunk
    /// whose `[mi, ma]` brackets the destination's upload time.
    pub fn edge_exists_upto(
        &self,
        src: NodeId,
        dep: NameId,
        dst: NodeId,
        cutoff: Epoch,
    ) -> Result<bool> {
        let t = self.upload_time(dst)?;
        if t > cutoff {
            return Ok(false);
        }
        let Some(header) = self.header(src, dep) else {
            return Ok(false);
        };

        // First chunk whose max reaches t.
        let mut chunk = header.ma.partition_point(|ma| *ma < t);
        while chunk < header.chunk_count() && header.mi[chunk] <= t {
            let body = self.chunk_body(src, dep, chunk)?;
            if self.chunk_contains(&body, t, dst)? {
                return Ok(true);
            }
            chunk += 1;
        }
        Ok(false)
    }

    /// Binary search `body` (ascending by upload time) for `dst` at time `t`.
    fn chunk_contains(&self, body: &[NodeId], t: Epoch, dst: NodeId) -> Result<bool> {
        // Lower bound of the equal-time run.
        let mut lo = 0usize;
        let mut hi = body.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.upload_time(body[mid])? < t {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let mut idx = lo;
        while idx < body.len() && self.upload_time(body[idx])? == t {
            if body[idx] == dst {
                return Ok(true);
            }
            idx += 1;
        }
        Ok(false)
    }

    /// Number of cached chunk bodies (test and diagnostics hook).
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.chunks.lock().len()
    }
}
