//! The dispatcher: argument validation, worker-count resolution, and the
//! spawn/join lifecycle of one [`parallel_for`] invocation.
//!
//! Each invocation spawns a fresh pool of workers, points them all at one
//! shared [`ChunkCursor`], and joins them before returning. Nothing persists
//! across calls and nothing is cancelled mid-flight: the only abort path is a
//! spawn failure, and even then every worker that did start is joined to
//! completion before the error is handed back.

use std::{collections::TryReserveError, io, panic, thread};

use bitflags::bitflags;
use log::{trace, warn};
use thiserror::Error;

use crate::{
    affinity::{self, AffinitySet},
    cursor::{ChunkCursor, WorkRange},
    priority::{self, WarnOnce},
};

// -----------------------------------------------------------------------------
// Options

bitflags! {
    /// Per-call worker capability toggles. Both are best-effort: a capability
    /// that cannot be granted is logged and the worker continues without it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Options: u32 {
        /// Pin each worker to one core, drawn round-robin from the eligible
        /// set. Caps the worker count at the eligible core count so that no
        /// two workers are pinned to the same core.
        const PIN_CORE = 1 << 0;
        /// Raise each worker to the highest fixed-priority realtime level
        /// the platform offers.
        const REALTIME = 1 << 1;
    }
}

// -----------------------------------------------------------------------------
// Errors

/// Failure modes of [`parallel_for`]. Best-effort capability failures
/// (pinning, elevation) are deliberately absent: those are logged, never
/// returned.
#[derive(Debug, Error)]
pub enum Error {
    /// `end` did not exceed `begin`. Rejected up front, before any thread is
    /// spawned, to surface caller misuse early.
    #[error("invalid index range {begin}..{end}")]
    InvalidRange { begin: i64, end: i64 },

    /// Bookkeeping space for the worker pool could not be reserved. No
    /// thread was spawned.
    #[error("failed to reserve space for {requested} worker handles")]
    OutOfMemory {
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// A worker thread could not be spawned. Workers spawned before the
    /// failure were joined to completion, so any work they claimed has run;
    /// the caller must treat the invocation as failed regardless.
    #[error("failed to spawn worker thread {ordinal}")]
    Spawn {
        ordinal: usize,
        #[source]
        source: io::Error,
    },
}

// -----------------------------------------------------------------------------
// Dispatcher

/// Applies `body` to every index in `[begin, end)` exactly once, using a pool
/// of worker threads spawned for the duration of this call.
///
/// Workers drain the range in contiguous chunks of at most `chunk` indices
/// (non-positive values are treated as 1) claimed from a shared cursor, so
/// uneven per-index costs balance themselves; smaller chunks improve balance
/// at the cost of more atomic claims. Within a chunk, indices are visited in
/// increasing order.
///
/// `nthreads == 0` uses every eligible core; when [`Options::PIN_CORE`] is
/// set the count is additionally capped at the eligible core count. The
/// eligible set is the process's current affinity mask, so external
/// restrictions (`taskset`, containers) are respected.
///
/// `body` has no way to signal per-index failure through this primitive. A
/// fallible workload records success into its own captured state, per index,
/// and the caller scans that state after the call returns. A `body` that
/// panics propagates the panic out of this call once every worker has been
/// joined.
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use presto::prelude::*;
///
/// let visited: Vec<AtomicU32> = (0..100).map(|_| AtomicU32::new(0)).collect();
/// parallel_for(0, 100, 8, 0, Options::empty(), |i| {
///     visited[i as usize].fetch_add(1, Ordering::Relaxed);
/// })
/// .unwrap();
/// assert!(visited.iter().all(|count| count.load(Ordering::Relaxed) == 1));
/// ```
pub fn parallel_for<F>(
    begin: i64,
    end: i64,
    chunk: i64,
    nthreads: usize,
    options: Options,
    body: F,
) -> Result<(), Error>
where
    F: Fn(i64) + Sync,
{
    if end <= begin {
        return Err(Error::InvalidRange { begin, end });
    }

    let range = WorkRange::new(begin, end, chunk);
    let eligible = AffinitySet::current();
    let count = effective_workers(nthreads, options, eligible.len());

    let cursor = ChunkCursor::new(range);
    let elevation_warned = WarnOnce::new();

    thread::scope(|scope| {
        let mut handles = Vec::new();
        handles
            .try_reserve_exact(count)
            .map_err(|source| Error::OutOfMemory {
                requested: count,
                source,
            })?;

        for ordinal in 0..count {
            let descriptor = WorkerDescriptor {
                ordinal,
                count,
                core: options
                    .contains(Options::PIN_CORE)
                    .then(|| eligible.core_for(ordinal)),
                options,
                cursor: &cursor,
                body: &body,
                elevation_warned: &elevation_warned,
            };
            let spawned = thread::Builder::new()
                .name(format!("presto-worker-{ordinal}"))
                .spawn_scoped(scope, move || worker_main(descriptor));
            match spawned {
                Ok(handle) => handles.push(handle),
                // Returning drops out of the scope, which joins every worker
                // already spawned before the error reaches the caller.
                Err(source) => return Err(Error::Spawn { ordinal, source }),
            }
        }

        for handle in handles {
            if let Err(payload) = handle.join() {
                panic::resume_unwind(payload);
            }
        }
        Ok(())
    })
}

/// Resolves the effective worker count from the requested `nthreads` and the
/// eligible core count. Zero requests the full eligible set; pinning caps the
/// count so every worker gets a distinct core.
fn effective_workers(nthreads: usize, options: Options, eligible: usize) -> usize {
    let mut count = if nthreads == 0 { eligible } else { nthreads };
    if options.contains(Options::PIN_CORE) {
        count = count.min(eligible);
    }
    count
}

// -----------------------------------------------------------------------------
// Workers

/// Per-worker configuration, built by the dispatcher before spawn and owned
/// by the worker thread until it joins.
struct WorkerDescriptor<'a, F> {
    ordinal: usize,
    count: usize,
    /// Resolved pinning target, or `None` when pinning was not requested.
    core: Option<usize>,
    options: Options,
    cursor: &'a ChunkCursor,
    body: &'a F,
    elevation_warned: &'a WarnOnce,
}

/// The worker loop. Applies its capabilities once, then claims chunks until
/// the shared cursor is exhausted.
fn worker_main<F>(descriptor: WorkerDescriptor<'_, F>)
where
    F: Fn(i64) + Sync,
{
    let WorkerDescriptor {
        ordinal,
        count,
        core,
        options,
        cursor,
        body,
        elevation_warned,
    } = descriptor;

    trace!("worker {ordinal}/{count} starting (core: {core:?})");

    if let Some(core) = core {
        affinity::pin_current_thread(core);
    }

    if options.contains(Options::REALTIME) {
        if let Err(err) = priority::elevate_current_thread() {
            if elevation_warned.first() {
                warn!("realtime elevation unavailable, workers continue at inherited priority: {err}");
            }
        }
    }

    while let Some(chunk) = cursor.claim() {
        for index in chunk {
            body(index);
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
