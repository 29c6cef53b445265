//! Newest-first streaming over one `(src, dep-name)` edge group.

use std::sync::Arc;

use retrodep_error::Result;
use retrodep_types::{Epoch, NameId, NodeId};

use crate::Context;

/// Cursor over the destinations of one edge group admissible at a cutoff,
/// yielded strictly newest-first.
///
/// When the dependency name is a pinned root's name, the chunk walk is
/// bypassed entirely: the pinned version is the one admissible
/// destination, or none at all if it postdates the cutoff. Otherwise
/// construction does the two-level binary search: the last chunk whose
/// `mi` is at or below the cutoff, then (when the cutoff falls inside that
/// chunk) the last admissible position within its body. Bodies of lower
/// chunks are fetched lazily as the cursor walks down; they are wholly
/// admissible by the monotone-boundary invariant, so no further searching
/// happens after construction.
pub struct NewestFirstCursor<'a> {
    ctx: &'a Context,
    src: NodeId,
    dep: NameId,
    /// Chunk to fetch next once the current body drains; walks downward.
    next_chunk: Option<usize>,
    /// Take only this many items from the first (boundary) chunk.
    boundary_take: Option<usize>,
    body: Option<Arc<Vec<NodeId>>>,
    /// Items left in the current body; `body[pos - 1]` is yielded next.
    pos: usize,
    remaining: usize,
}

impl<'a> NewestFirstCursor<'a> {
    /// Open a cursor for `(src, dep)` at `cutoff`, with `root` naming the
    /// resolution's pinned `(root name, root version)` pair, if any.
    ///
    /// An absent header or a cutoff older than every destination yields an
    /// empty cursor, not an error.
    pub fn open(
        ctx: &'a Context,
        src: NodeId,
        dep: NameId,
        cutoff: Epoch,
        root: Option<(NameId, NodeId)>,
    ) -> Result<Self> {
        // Root override: the pinned version is the only admissible
        // destination for its name, whatever the headers hold.
        if let Some((root_name, root_node)) = root {
            if dep == root_name {
                if ctx.upload_time(root_node)? > cutoff {
                    return Ok(Self::empty(ctx, src, dep));
                }
                return Ok(Self {
                    ctx,
                    src,
                    dep,
                    next_chunk: None,
                    boundary_take: None,
                    body: Some(Arc::new(vec![root_node])),
                    pos: 1,
                    remaining: 1,
                });
            }
        }

        let Some(header) = ctx.header(src, dep) else {
            return Ok(Self::empty(ctx, src, dep));
        };

        // Last chunk whose minimum is at or below the cutoff.
        let upper = header.mi.partition_point(|mi| *mi <= cutoff);
        let Some(boundary) = upper.checked_sub(1) else {
            return Ok(Self::empty(ctx, src, dep));
        };

        let whole: usize = header.n[..boundary]
            .iter()
            .map(|&c| c as usize)
            .sum();

        let boundary_take = if header.ma[boundary] <= cutoff {
            header.n[boundary] as usize
        } else {
            // Cutoff falls inside the boundary chunk.
            let body = ctx.chunk_body(src, dep, boundary)?;
            last_admissible(ctx, &body, cutoff)?.map_or(0, |idx| idx + 1)
        };

        Ok(Self {
            ctx,
            src,
            dep,
            next_chunk: Some(boundary),
            boundary_take: Some(boundary_take),
            body: None,
            pos: 0,
            remaining: whole + boundary_take,
        })
    }

    fn empty(ctx: &'a Context, src: NodeId, dep: NameId) -> Self {
        Self {
            ctx,
            src,
            dep,
            next_chunk: None,
            boundary_take: None,
            body: None,
            pos: 0,
            remaining: 0,
        }
    }

    /// Destinations this cursor has yet to yield.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Next-newest admissible destination, or `None` when drained.
    pub fn next(&mut self) -> Result<Option<NodeId>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        while self.pos == 0 {
            let Some(chunk) = self.next_chunk else {
                // remaining said more items exist but the chunks ran out;
                // the headers lied about their counts.
                return Err(retrodep_error::RetroError::corrupt(format!(
                    "edge group src={} dep={} shorter than its header",
                    self.src, self.dep
                )));
            };
            let body = self.ctx.chunk_body(self.src, self.dep, chunk)?;
            // A body shorter than its header count is caught below via the
            // remaining counter rather than an out-of-bounds index.
            self.pos = match self.boundary_take.take() {
                Some(take) => take.min(body.len()),
                None => body.len(),
            };
            self.body = Some(body);
            self.next_chunk = chunk.checked_sub(1);
        }

        let body = self.body.as_ref().expect("pos > 0 implies a body");
        self.pos -= 1;
        self.remaining -= 1;
        Ok(Some(body[self.pos]))
    }

    /// Drain into a vector. Test and diagnostics convenience.
    pub fn collect_all(mut self) -> Result<Vec<NodeId>> {
        let mut out = Vec::with_capacity(self.remaining);
        while let Some(node) = self.next()? {
            out.push(node);
        }
        Ok(out)
    }
}

/// Index of the last body entry uploaded at or before `cutoff`.
fn last_admissible(ctx: &Context, body: &[NodeId], cutoff: Epoch) -> Result<Option<usize>> {
    let mut lo = 0usize;
    let mut hi = body.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if ctx.upload_time(body[mid])? <= cutoff {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo.checked_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrodep_store::MemStore;

    fn ctx_from(store: MemStore) -> Context {
        Context::load(Box::new(store), 16).expect("context loads")
    }

    /// Header with chunks `ma = [10, 20]`, bodies `[a@5, b@8]`, `[c@15, d@19]`.
    fn chunked_store() -> MemStore {
        let mut store = MemStore::new();
        store
            .add_node(0, 0, u32::MAX, 1)
            .add_node(10, 1, u32::MAX, 5) // a
            .add_node(11, 1, u32::MAX, 8) // b
            .add_node(12, 1, u32::MAX, 15) // c
            .add_node(13, 1, u32::MAX, 19) // d
            .add_header(0, 1, &[5, 15], &[10, 20], &[2, 2])
            .add_chunk(0, 1, 0, &[10, 11])
            .add_chunk(0, 1, 1, &[12, 13]);
        store
    }

    fn drain(ctx: &Context, cutoff: i64) -> Vec<u32> {
        NewestFirstCursor::open(ctx, NodeId::new(0), NameId::new(1), Epoch::new(cutoff), None)
            .expect("open")
            .collect_all()
            .expect("drain")
            .into_iter()
            .map(NodeId::get)
            .collect()
    }

    #[test]
    fn test_cutoff_inside_chunk_truncates() {
        let ctx = ctx_from(chunked_store());
        // At cutoff 16 only c from the newest chunk qualifies.
        assert_eq!(drain(&ctx, 16), vec![12, 11, 10]);
    }

    #[test]
    fn test_cutoff_beyond_everything_yields_all_reversed() {
        let ctx = ctx_from(chunked_store());
        assert_eq!(drain(&ctx, 100), vec![13, 12, 11, 10]);
    }

    #[test]
    fn test_cutoff_before_everything_is_empty() {
        let ctx = ctx_from(chunked_store());
        assert_eq!(drain(&ctx, 4), Vec::<u32>::new());
    }

    #[test]
    fn test_cutoff_at_exact_boundary_includes_entry() {
        let ctx = ctx_from(chunked_store());
        assert_eq!(drain(&ctx, 8), vec![11, 10]);
        assert_eq!(drain(&ctx, 15), vec![12, 11, 10]);
    }

    #[test]
    fn test_root_name_yields_only_the_pinned_version() {
        let ctx = ctx_from(chunked_store());
        // Name 1 is the pinned root's name: the chunk walk is skipped and
        // only the pinned version 12 comes out, never the newer 13.
        let root = Some((NameId::new(1), NodeId::new(12)));
        let cursor =
            NewestFirstCursor::open(&ctx, NodeId::new(0), NameId::new(1), Epoch::new(100), root)
                .expect("open");
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(
            cursor.collect_all().expect("drain"),
            vec![NodeId::new(12)]
        );
    }

    #[test]
    fn test_root_name_postdating_cutoff_is_empty() {
        let ctx = ctx_from(chunked_store());
        // Pinned version 12 uploaded at 15 > cutoff 10: nothing comes out
        // even though older versions of name 1 would be admissible.
        let root = Some((NameId::new(1), NodeId::new(12)));
        let cursor =
            NewestFirstCursor::open(&ctx, NodeId::new(0), NameId::new(1), Epoch::new(10), root)
                .expect("open");
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.collect_all().expect("drain"), vec![]);
    }

    #[test]
    fn test_other_names_ignore_the_root_pin() {
        let ctx = ctx_from(chunked_store());
        // The pin names a different package, so the walk runs as usual.
        let root = Some((NameId::new(9), NodeId::new(0)));
        let got =
            NewestFirstCursor::open(&ctx, NodeId::new(0), NameId::new(1), Epoch::new(16), root)
                .expect("open")
                .collect_all()
                .expect("drain");
        let raw: Vec<u32> = got.into_iter().map(NodeId::get).collect();
        assert_eq!(raw, vec![12, 11, 10]);
    }

    #[test]
    fn test_absent_header_is_empty_cursor() {
        let ctx = ctx_from(chunked_store());
        let cursor =
            NewestFirstCursor::open(&ctx, NodeId::new(10), NameId::new(0), Epoch::new(100), None)
                .expect("open");
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.collect_all().expect("drain"), vec![]);
    }

    #[test]
    fn test_remaining_counts_match_yield() {
        let ctx = ctx_from(chunked_store());
        let mut cursor =
            NewestFirstCursor::open(&ctx, NodeId::new(0), NameId::new(1), Epoch::new(16), None)
                .expect("open");
        assert_eq!(cursor.remaining(), 3);
        let _ = cursor.next().expect("next");
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn test_lower_chunks_fetched_lazily() {
        let ctx = ctx_from(chunked_store());
        let mut cursor =
            NewestFirstCursor::open(&ctx, NodeId::new(0), NameId::new(1), Epoch::new(16), None)
                .expect("open");
        // Boundary chunk was fetched during construction; the older chunk
        // must not be touched until the cursor reaches it.
        assert_eq!(ctx.cached_chunks(), 1);
        let _ = cursor.next().expect("next");
        assert_eq!(ctx.cached_chunks(), 1);
        let _ = cursor.next().expect("next");
        assert_eq!(ctx.cached_chunks(), 2);
    }

    proptest::proptest! {
        /// Growing the cutoff only ever appends newer entries at the front;
        /// the older tail is a suffix of the larger sequence.
        #[test]
        fn prop_sequence_is_suffix_under_larger_cutoff(t1 in 0i64..25, t2 in 0i64..25) {
            let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
            let ctx = ctx_from(chunked_store());
            let small = drain(&ctx, lo);
            let large = drain(&ctx, hi);
            proptest::prop_assert!(small.len() <= large.len());
            proptest::prop_assert_eq!(&large[large.len() - small.len()..], &small[..]);
        }
    }
}
