//! Batch resolution over every node of a subgraph.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use retrodep::{Context, ResolveRequest, Runner, SqliteStore};
use retrodep_error::{Result, RetroError};
use retrodep_types::NodeId;

#[derive(Debug)]
pub struct BatchConfig {
    pub db: PathBuf,
    pub subgraph: PathBuf,
    pub root: NodeId,
    pub out: PathBuf,
    pub debug_dir: Option<PathBuf>,
    pub lru_capacity: usize,
    pub max_rounds: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub resolved: usize,
}

/// Distinct node ids of a `[[src, dst], ...]` edge list, ascending.
pub fn subgraph_nodes(json: &str) -> Result<Vec<NodeId>> {
    let edges: Vec<(u32, u32)> = serde_json::from_str(json)
        .map_err(|err| RetroError::corrupt(format!("subgraph is not a JSON edge list: {err}")))?;
    let mut nodes = BTreeSet::new();
    for (src, dst) in edges {
        let _ = nodes.insert(src);
        let _ = nodes.insert(dst);
    }
    Ok(nodes.into_iter().map(NodeId::new).collect())
}

/// Resolve every subgraph node against the pinned root and write one CSV
/// row per node.
pub fn run_batch(config: &BatchConfig) -> Result<BatchSummary> {
    let store = SqliteStore::open(&config.db)?;
    let ctx = Context::load(Box::new(store), config.lru_capacity)?;
    let runner = Runner::new(&ctx);

    let nodes = subgraph_nodes(&fs::read_to_string(&config.subgraph)?)?;
    let root_meta = ctx.node(config.root)?;
    info!(
        root = %config.root,
        root_name = %root_meta.name,
        nodes = nodes.len(),
        "batch resolution starting"
    );

    if let Some(dir) = &config.debug_dir {
        fs::create_dir_all(dir)?;
    }

    let mut csv = fs::File::create(&config.out)?;
    writeln!(csv, "node_id,resolved,depth")?;

    let mut resolved_count = 0usize;
    for node in &nodes {
        let node_time = ctx.upload_time(*node)?;
        let cutoff = node_time.max(root_meta.upload);
        let request = ResolveRequest::new(*node, config.root, root_meta.name, cutoff)
            .with_debug(config.debug_dir.is_some())
            .with_max_rounds(config.max_rounds);

        let res = runner.resolve(&request)?;
        debug!(node = %node, resolved = res.resolved, depth = res.depth, "node finished");
        writeln!(csv, "{},{},{}", node, res.resolved, res.depth)?;

        if res.resolved {
            resolved_count += 1;
        }
        if let (Some(dir), Some(tree)) = (&config.debug_dir, &res.tree) {
            write_tree(dir, *node, tree)?;
        }
    }

    let summary = BatchSummary {
        total: nodes.len(),
        resolved: resolved_count,
    };
    info!(
        total = summary.total,
        resolved = summary.resolved,
        out = %config.out.display(),
        "batch resolution finished"
    );
    Ok(summary)
}

fn write_tree(dir: &Path, node: NodeId, tree: &retrodep::DebugTree) -> Result<()> {
    let payload = serde_json::to_vec_pretty(tree)
        .map_err(|err| RetroError::internal(format!("tree serialize: {err}")))?;
    fs::write(dir.join(format!("{node}.json")), payload)?;
    Ok(())
}
