//! A dynamic chunked parallel-for over integer ranges.
//!
//! Presto applies a caller-supplied operation to every index in a half-open
//! range `[begin, end)` using a bounded pool of worker threads spawned for
//! the duration of one call. There is no work queue and no work-stealing:
//! workers drain the range through a single shared lock-free cursor, claiming
//! one contiguous chunk of indices at a time. Whoever finishes a chunk first
//! simply claims the next one, so uneven per-index costs balance themselves,
//! and chunk size is the only balancing knob exposed to the caller.
//!
//! Two best-effort worker capabilities can be requested per call: pinning
//! each worker to one core drawn from the process's own affinity mask, and
//! raising workers to the platform's realtime scheduling class. Both degrade
//! gracefully: a capability that cannot be granted is logged through the
//! [`log`] facade and the worker carries on without it.
//!
//! The pool lives exactly as long as the call: every invocation spawns its
//! workers, joins them all, and returns an aggregate result. There is no
//! cancellation; the only failure path that interrupts dispatch is a thread
//! spawn error, and even then the workers that did start are joined to
//! completion before the error is returned.
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use presto::prelude::*;
//!
//! let visited: Vec<AtomicU32> = (0..1024).map(|_| AtomicU32::new(0)).collect();
//!
//! parallel_for(0, 1024, 64, 0, Options::empty(), |i| {
//!     visited[i as usize].fetch_add(1, Ordering::Relaxed);
//! })
//! .unwrap();
//!
//! assert!(visited.iter().all(|count| count.load(Ordering::Relaxed) == 1));
//! ```

pub mod affinity;
pub mod cursor;
pub mod dispatch;
pub mod priority;

pub mod prelude {
    pub use crate::dispatch::{parallel_for, Error, Options};
}
