//! `retrodep-batch`: resolve every node of a subgraph against a pinned
//! root version and write a CSV of `(node_id, resolved, depth)`.

mod batch;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use retrodep::{DEFAULT_CHUNK_CACHE_CAPACITY, DEFAULT_MAX_ROUNDS};
use retrodep_types::NodeId;

use crate::batch::{run_batch, BatchConfig};

/// Time-aware batch resolution over a subgraph.
#[derive(Debug, Parser)]
#[command(name = "retrodep-batch", version)]
struct Cli {
    /// SQLite graph database produced by the preprocessor.
    #[arg(long, value_name = "PATH")]
    db: PathBuf,

    /// JSON edge list [[src, dst], ...] naming the node set.
    #[arg(long, value_name = "PATH")]
    subgraph: PathBuf,

    /// Pinned root package-version.
    #[arg(long, value_name = "NODE_ID")]
    root: u32,

    /// CSV output path (node_id,resolved,depth).
    #[arg(long, value_name = "PATH")]
    out: PathBuf,

    /// Also write one JSON result tree per node.
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<PathBuf>,

    /// Chunk cache entries.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CHUNK_CACHE_CAPACITY)]
    lru_capacity: usize,

    /// Resolution round limit per node.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ROUNDS)]
    max_rounds: usize,
}

impl Cli {
    fn into_config(self) -> BatchConfig {
        BatchConfig {
            db: self.db,
            subgraph: self.subgraph,
            root: NodeId::new(self.root),
            out: self.out,
            debug_dir: self.debug_dir,
            lru_capacity: self.lru_capacity,
            max_rounds: self.max_rounds,
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = cli.into_config();
    let summary = run_batch(&config).map_err(|err| err.to_string())?;
    println!(
        "resolved {}/{} nodes -> {}",
        summary.resolved,
        summary.total,
        config.out.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ERROR retrodep-batch failed: {error}");
            ExitCode::from(2)
        }
    }
}
