//! The shared claim cursor: lock-free distribution of index chunks.
//!
//! One cursor is created per `parallel_for` invocation and discarded once
//! every worker has joined. Workers race on [`ChunkCursor::claim`], and the
//! fetch-and-add guarantees that each chunk start is handed to exactly one of
//! them: the sequence of claimed starts, in claim order, tiles the range
//! `[begin, end)` with step `chunk` (the final chunk may be short). Workers
//! that finish a chunk quickly simply claim the next one, so uneven per-index
//! costs balance themselves without a work queue or locks.

use std::{
    ops::Range,
    sync::atomic::{AtomicI64, Ordering},
};

use crossbeam_utils::CachePadded;

// -----------------------------------------------------------------------------
// Work range

/// The index domain for a single invocation: the half-open range
/// `[begin, end)` visited in contiguous chunks of at most `chunk` indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkRange {
    /// First index to visit.
    pub begin: i64,
    /// One past the last index to visit.
    pub end: i64,
    /// Claim granularity. Always at least 1.
    pub chunk: i64,
}

impl WorkRange {
    /// Builds the range `[begin, end)` claimed in steps of `chunk`. A
    /// non-positive `chunk` is coerced to 1.
    pub fn new(begin: i64, end: i64, chunk: i64) -> WorkRange {
        WorkRange {
            begin,
            end,
            chunk: chunk.max(1),
        }
    }
}

// -----------------------------------------------------------------------------
// Chunk cursor

/// The single integer shared by all workers of one invocation, marking the
/// next unclaimed index.
///
/// The cursor is only ever advanced with a single atomic fetch-and-add, never
/// a separate load and store, so no two workers can claim overlapping chunks
/// and no index is skipped.
pub struct ChunkCursor {
    /// Next unclaimed index. Padded so the heavily-written cursor does not
    /// share a cache line with the read-only bounds below.
    next: CachePadded<AtomicI64>,
    end: i64,
    chunk: i64,
}

impl ChunkCursor {
    /// Creates a cursor positioned at the start of `range`.
    pub fn new(range: WorkRange) -> ChunkCursor {
        ChunkCursor {
            next: CachePadded::new(AtomicI64::new(range.begin)),
            end: range.end,
            chunk: range.chunk,
        }
    }

    /// Claims the next chunk of indices, or returns `None` once the range is
    /// exhausted. The returned range never overlaps another claim and never
    /// extends past `end`.
    ///
    /// The cursor is a pure claim counter: no data is published through it,
    /// so relaxed ordering suffices. The caller observes its own claim on the
    /// same thread that made it.
    #[inline]
    pub fn claim(&self) -> Option<Range<i64>> {
        let start = self.next.fetch_add(self.chunk, Ordering::Relaxed);
        if start >= self.end {
            return None;
        }
        Some(start..i64::min(start + self.chunk, self.end))
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use super::*;

    #[test]
    fn claims_tile_the_range_in_order() {
        let cursor = ChunkCursor::new(WorkRange::new(0, 10, 3));
        assert_eq!(cursor.claim(), Some(0..3));
        assert_eq!(cursor.claim(), Some(3..6));
        assert_eq!(cursor.claim(), Some(6..9));
        assert_eq!(cursor.claim(), Some(9..10));
        assert_eq!(cursor.claim(), None);
        // Still exhausted on later claims.
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn oversized_chunk_yields_a_single_claim() {
        let cursor = ChunkCursor::new(WorkRange::new(4, 7, 100));
        assert_eq!(cursor.claim(), Some(4..7));
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn non_positive_chunk_is_coerced_to_one() {
        assert_eq!(WorkRange::new(0, 5, 0).chunk, 1);
        assert_eq!(WorkRange::new(0, 5, -7).chunk, 1);

        let cursor = ChunkCursor::new(WorkRange::new(0, 3, 0));
        assert_eq!(cursor.claim(), Some(0..1));
        assert_eq!(cursor.claim(), Some(1..2));
        assert_eq!(cursor.claim(), Some(2..3));
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn negative_indices_tile_like_any_other() {
        let cursor = ChunkCursor::new(WorkRange::new(-5, 5, 4));
        assert_eq!(cursor.claim(), Some(-5..-1));
        assert_eq!(cursor.claim(), Some(-1..3));
        assert_eq!(cursor.claim(), Some(3..5));
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn concurrent_claims_partition_the_range() {
        let cursor = ChunkCursor::new(WorkRange::new(0, 10_000, 7));
        let claims = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    while let Some(chunk) = cursor.claim() {
                        local.push(chunk);
                    }
                    claims.lock().unwrap().extend(local);
                });
            }
        });

        let mut claims = claims.into_inner().unwrap();
        claims.sort_by_key(|chunk| chunk.start);

        // Sorted claims must cover [0, 10_000) with no gaps or overlaps.
        let mut expected_start = 0;
        for chunk in &claims {
            assert_eq!(chunk.start, expected_start);
            assert!(chunk.end > chunk.start);
            expected_start = chunk.end;
        }
        assert_eq!(expected_start, 10_000);
    }
}
