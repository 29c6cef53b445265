//! In-memory store used as the fixture type across the workspace's tests.
//!
//! Rows are held in hash maps and handed out by clone. Chunk fetches are
//! counted so cache tests can assert how often the "database" was hit.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use retrodep_error::Result;
use retrodep_types::{DepsRow, Epoch, HeaderRow, InterpreterMask, NameId, NodeId, NodeRow};

use crate::GraphStore;

#[derive(Default)]
pub struct MemStore {
    nodes: Vec<NodeRow>,
    names: Vec<(NameId, String)>,
    deps: Vec<DepsRow>,
    headers: Vec<HeaderRow>,
    chunks: HashMap<(NodeId, NameId, usize), Vec<NodeId>>,
    fetches: AtomicU64,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one package-version.
    pub fn add_node(&mut self, node: u32, name: u32, mask: u32, first_upload: i64) -> &mut Self {
        self.nodes.push(NodeRow {
            node: NodeId::new(node),
            name: NameId::new(name),
            py_mask: InterpreterMask::from_bits(mask),
            first_upload: Epoch::new(first_upload),
        });
        self
    }

    /// Register a package name string.
    pub fn add_name(&mut self, name: u32, text: &str) -> &mut Self {
        self.names.push((NameId::new(name), text.to_owned()));
        self
    }

    /// Set the direct-dependency name list of `node`.
    pub fn add_deps(&mut self, node: u32, deps: &[u32]) -> &mut Self {
        self.deps.push(DepsRow {
            node: NodeId::new(node),
            deps: deps.iter().copied().map(NameId::new).collect(),
        });
        self
    }

    /// Register an edge group's chunk header.
    pub fn add_header(
        &mut self,
        src: u32,
        dep: u32,
        mi: &[i64],
        ma: &[i64],
        n: &[u32],
    ) -> &mut Self {
        self.headers.push(HeaderRow {
            src: NodeId::new(src),
            dep: NameId::new(dep),
            mi: mi.iter().copied().map(Epoch::new).collect(),
            ma: ma.iter().copied().map(Epoch::new).collect(),
            n: n.to_vec(),
            total: n.iter().map(|&c| u64::from(c)).sum(),
        });
        self
    }

    /// Store one chunk body.
    pub fn add_chunk(&mut self, src: u32, dep: u32, chunk: usize, dst_ids: &[u32]) -> &mut Self {
        self.chunks.insert(
            (NodeId::new(src), NameId::new(dep), chunk),
            dst_ids.iter().copied().map(NodeId::new).collect(),
        );
        self
    }

    /// How many chunk bodies were fetched through the trait so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl GraphStore for MemStore {
    fn load_nodes(&self) -> Result<Vec<NodeRow>> {
        Ok(self.nodes.clone())
    }

    fn load_names(&self) -> Result<Vec<(NameId, String)>> {
        Ok(self.names.clone())
    }

    fn load_deps(&self) -> Result<Vec<DepsRow>> {
        Ok(self.deps.clone())
    }

    fn load_headers(&self) -> Result<Vec<HeaderRow>> {
        Ok(self.headers.clone())
    }

    fn fetch_chunk(&self, src: NodeId, dep: NameId, chunk: usize) -> Result<Option<Vec<NodeId>>> {
        let _ = self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.chunks.get(&(src, dep, chunk)).cloned())
    }
}
