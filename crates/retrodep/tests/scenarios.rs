//! End-to-end resolution scenarios against in-memory fixtures.

use std::collections::BTreeMap;

use retrodep::{
    Context, Epoch, MemStore, NameId, NodeId, Resolution, ResolveRequest, Runner,
};

fn ctx_from(store: MemStore) -> Context {
    Context::load(Box::new(store), 64).expect("context loads")
}

fn resolve(ctx: &Context, start: u32, root: u32, root_name: u32, cutoff: i64) -> Resolution {
    Runner::new(ctx)
        .resolve(
            &ResolveRequest::new(
                NodeId::new(start),
                NodeId::new(root),
                NameId::new(root_name),
                Epoch::new(cutoff),
            )
            .with_debug(true),
        )
        .expect("resolve runs")
}

fn mapping_of(res: &Resolution) -> BTreeMap<u32, u32> {
    res.tree
        .as_ref()
        .expect("debug tree requested")
        .mapping
        .iter()
        .map(|(name, node)| (name.get(), node.get()))
        .collect()
}

#[test]
fn trivial_pinning_of_a_leaf() {
    let mut store = MemStore::new();
    store.add_node(0, 0, u32::MAX, 100);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 0, 0, 100);
    assert!(res.resolved);
    assert_eq!(res.depth, 0);

    let tree = res.tree.as_ref().expect("tree");
    assert_eq!(tree.nodes, vec![NodeId::new(0)]);
    assert!(tree.edges.is_empty());
    assert_eq!(mapping_of(&res), BTreeMap::from([(0, 0)]));
}

#[test]
fn direct_dependency_on_the_root() {
    // Node 0 (name 0) depends on the root's name 1; the only destination
    // admissible at the cutoff is the root itself.
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 50)
        .add_node(10, 1, u32::MAX, 40)
        .add_node(11, 1, u32::MAX, 90) // newer version, after cutoff
        .add_deps(0, &[1])
        .add_header(0, 1, &[40, 90], &[40, 90], &[1, 1])
        .add_chunk(0, 1, 0, &[10])
        .add_chunk(0, 1, 1, &[11]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 10, 1, 50);
    assert!(res.resolved);
    assert_eq!(res.depth, 1);
    let tree = res.tree.as_ref().expect("tree");
    assert_eq!(tree.edges, vec![(NodeId::new(0), NodeId::new(10))]);
}

#[test]
fn root_pin_overrides_parent_edges() {
    // Node 0 has edges to three versions of name 1, none of which is the
    // pinned root (node 19). The root wins anyway when admissible.
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 50)
        .add_node(10, 1, u32::MAX, 10)
        .add_node(11, 1, u32::MAX, 20)
        .add_node(12, 1, u32::MAX, 30)
        .add_node(19, 1, u32::MAX, 25)
        .add_deps(0, &[1])
        .add_header(0, 1, &[10], &[30], &[3])
        .add_chunk(0, 1, 0, &[10, 11, 12]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 19, 1, 50);
    assert!(res.resolved);
    assert_eq!(mapping_of(&res), BTreeMap::from([(0, 0), (1, 19)]));
}

#[test]
fn root_pin_fails_when_root_postdates_cutoff() {
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 50)
        .add_node(10, 1, u32::MAX, 10)
        .add_node(19, 1, u32::MAX, 80) // root uploaded after the cutoff
        .add_deps(0, &[1])
        .add_header(0, 1, &[10], &[10], &[1])
        .add_chunk(0, 1, 0, &[10]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 19, 1, 50);
    assert!(!res.resolved);
    assert_eq!(res.depth, -1);
    assert!(res.tree.is_none());
}

#[test]
fn disjoint_interpreter_masks_fail() {
    // The start only supports 2.x bits, its sole dependency only 3.x bits.
    let mut store = MemStore::new();
    store
        .add_node(0, 0, 0b0011, 50)
        .add_node(10, 1, 0b1100, 10)
        .add_node(99, 9, u32::MAX, 1)
        .add_deps(0, &[1])
        .add_header(0, 1, &[10], &[10], &[1])
        .add_chunk(0, 1, 0, &[10]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 99, 9, 50);
    assert!(!res.resolved);
    assert_eq!(res.depth, -1);
    assert!(res.tree.is_none());
}

#[test]
fn backjump_marks_newest_incompatible_and_retries() {
    // Names 1 and 2 are both demanded and name 1 is pinned first (fewer
    // candidates) to its newest version 11. Every version of name 2 also
    // demands name 1 but reaches only the older 10, so the engine must
    // unwind the 11 pin, mark it incompatible, and settle on 10 with the
    // newest version of name 2.
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 100)
        .add_node(10, 1, u32::MAX, 5)
        .add_node(11, 1, u32::MAX, 20)
        .add_node(20, 2, u32::MAX, 6)
        .add_node(21, 2, u32::MAX, 7)
        .add_node(22, 2, u32::MAX, 9)
        .add_deps(0, &[1, 2])
        .add_deps(20, &[1])
        .add_deps(21, &[1])
        .add_deps(22, &[1])
        .add_header(0, 1, &[5, 20], &[5, 20], &[1, 1])
        .add_chunk(0, 1, 0, &[10])
        .add_chunk(0, 1, 1, &[11])
        .add_header(0, 2, &[6], &[9], &[3])
        .add_chunk(0, 2, 0, &[20, 21, 22])
        .add_header(20, 1, &[5], &[5], &[1])
        .add_chunk(20, 1, 0, &[10])
        .add_header(21, 1, &[5], &[5], &[1])
        .add_chunk(21, 1, 0, &[10])
        .add_header(22, 1, &[5], &[5], &[1])
        .add_chunk(22, 1, 0, &[10]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 0, 0, 100);
    assert!(res.resolved);
    assert_eq!(
        mapping_of(&res),
        BTreeMap::from([(0, 0), (1, 10), (2, 22)])
    );
}

#[test]
fn resolution_is_deterministic() {
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 100)
        .add_node(10, 1, u32::MAX, 5)
        .add_node(11, 1, u32::MAX, 20)
        .add_node(20, 2, u32::MAX, 8)
        .add_deps(0, &[1, 2])
        .add_header(0, 1, &[5, 20], &[5, 20], &[1, 1])
        .add_chunk(0, 1, 0, &[10])
        .add_chunk(0, 1, 1, &[11])
        .add_header(0, 2, &[8], &[8], &[1])
        .add_chunk(0, 2, 0, &[20]);
    let ctx = ctx_from(store);

    let first = resolve(&ctx, 0, 0, 0, 100);
    let second = resolve(&ctx, 0, 0, 0, 100);
    assert_eq!(first.resolved, second.resolved);
    assert_eq!(first.depth, second.depth);
    assert_eq!(mapping_of(&first), mapping_of(&second));
    assert_eq!(
        first.tree.as_ref().expect("tree").edges,
        second.tree.as_ref().expect("tree").edges
    );
}

#[test]
fn debug_tree_retraversal_reproduces_the_mapping() {
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 100)
        .add_node(10, 1, u32::MAX, 5)
        .add_deps(0, &[1])
        .add_header(0, 1, &[5], &[5], &[1])
        .add_chunk(0, 1, 0, &[10]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 10, 1, 100);
    let tree = res.tree.as_ref().expect("tree");

    // Walk the emitted edges from the start; every visited node must match
    // the mapping entry for its name, and all mapped nodes must be visited.
    let mut visited = vec![NodeId::new(0)];
    let mut frontier = vec![NodeId::new(0)];
    while let Some(node) = frontier.pop() {
        for (src, dst) in &tree.edges {
            if *src == node && !visited.contains(dst) {
                visited.push(*dst);
                frontier.push(*dst);
            }
        }
    }
    visited.sort_unstable();
    let mut mapped: Vec<NodeId> = tree.mapping.values().copied().collect();
    mapped.sort_unstable();
    assert_eq!(visited, mapped);
}

#[test]
fn tree_serializes_to_the_documented_shape() {
    let mut store = MemStore::new();
    store
        .add_node(0, 0, u32::MAX, 100)
        .add_node(10, 1, u32::MAX, 5)
        .add_deps(0, &[1])
        .add_header(0, 1, &[5], &[5], &[1])
        .add_chunk(0, 1, 0, &[10]);
    let ctx = ctx_from(store);

    let res = resolve(&ctx, 0, 10, 1, 100);
    let json = serde_json::to_value(res.tree.expect("tree")).expect("serialize");
    assert_eq!(json["nodes"], serde_json::json!([0, 10]));
    assert_eq!(json["edges"], serde_json::json!([[0, 10]]));
    assert_eq!(json["mapping"]["0"], serde_json::json!(0));
    assert_eq!(json["mapping"]["1"], serde_json::json!(10));
}
