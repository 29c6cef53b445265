//! Per-call entry point: provider construction, engine run, result graph.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use hashbrown::HashMap;
use serde::Serialize;
use tracing::debug;

use retrodep_error::{Result, RetroError};
use retrodep_graph::Context;
use retrodep_resolver::{Engine, Outcome, Provider, ResolutionState, DEFAULT_MAX_ROUNDS};
use retrodep_types::{Epoch, NameId, NodeId, Requirement};

/// Configuration of one resolution call.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest {
    pub start: NodeId,
    pub root: NodeId,
    pub root_name: NameId,
    pub cutoff: Epoch,
    pub debug: bool,
    pub max_rounds: usize,
}

impl ResolveRequest {
    #[must_use]
    pub const fn new(start: NodeId, root: NodeId, root_name: NameId, cutoff: Epoch) -> Self {
        Self {
            start,
            root,
            root_name,
            cutoff,
            debug: false,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Emit the result tree alongside the verdict.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the round limit guarding pathological backtracking.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

/// Verdict of one resolution call.
///
/// An unsatisfiable input and an exhausted round limit share the same
/// shape: `resolved == false`, `depth == -1`, no tree. Only data-layer
/// failures are errors.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub resolved: bool,
    pub depth: i32,
    pub tree: Option<DebugTree>,
}

impl Resolution {
    const fn failed() -> Self {
        Self {
            resolved: false,
            depth: -1,
            tree: None,
        }
    }
}

/// Result graph emitted under `debug`.
#[derive(Debug, Clone, Serialize)]
pub struct DebugTree {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub mapping: BTreeMap<NameId, NodeId>,
}

/// Runs resolution calls against one shared [`Context`].
pub struct Runner<'a> {
    ctx: &'a Context,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub const fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Resolve one `(start, root, cutoff)` tuple.
    pub fn resolve(&self, request: &ResolveRequest) -> Result<Resolution> {
        let mut provider = Provider::new(
            self.ctx,
            request.start,
            request.root,
            request.root_name,
            request.cutoff,
        )?;
        let seed = Requirement::root(provider.start_name());

        let outcome = Engine::new(&mut provider, request.max_rounds).resolve(seed)?;
        let state = match outcome {
            Outcome::Success(state) => state,
            Outcome::Unresolvable { causes } => {
                debug!(start = %request.start, causes = causes.len(), "unresolvable");
                return Ok(Resolution::failed());
            }
            Outcome::RoundLimit => {
                debug!(start = %request.start, "round limit exceeded");
                return Ok(Resolution::failed());
            }
        };

        self.finish(request, &state)
    }

    /// Build the result graph, compute depth, optionally emit the tree.
    fn finish(&self, request: &ResolveRequest, state: &ResolutionState) -> Result<Resolution> {
        let mapping: BTreeMap<NameId, NodeId> = state
            .mapping
            .iter()
            .map(|(name, candidate)| (*name, candidate.node))
            .collect();

        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        for (_, candidate) in &state.mapping {
            for dep in self.ctx.deps_of(candidate.node)? {
                let Some(&target) = mapping.get(dep) else {
                    return Err(RetroError::internal(format!(
                        "pinned node {} demands unpinned name {dep}",
                        candidate.node
                    )));
                };
                edges.push((candidate.node, target));
            }
        }

        let depth = bfs_depth(&edges, request.start, request.root);

        let tree = request.debug.then(|| DebugTree {
            nodes: state.mapping.iter().map(|(_, c)| c.node).collect(),
            edges: edges.clone(),
            mapping,
        });

        Ok(Resolution {
            resolved: true,
            depth,
            tree,
        })
    }
}

/// Shortest hop count from `start` to `root` over forward edges; -1 when
/// unreachable.
fn bfs_depth(edges: &[(NodeId, NodeId)], start: NodeId, root: NodeId) -> i32 {
    if start == root {
        return 0;
    }

    let mut forward: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (src, dst) in edges {
        forward.entry(*src).or_default().push(*dst);
    }

    let mut seen: HashMap<NodeId, i32> = HashMap::new();
    let _ = seen.insert(start, 0);
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let dist = seen[&node];
        let Some(nexts) = forward.get(&node) else {
            continue;
        };
        for &next in nexts {
            if next == root {
                return dist + 1;
            }
            if !seen.contains_key(&next) {
                let _ = seen.insert(next, dist + 1);
                queue.push_back(next);
            }
        }
    }
    -1
}
