//! Best-effort realtime elevation for worker threads.
//!
//! Elevation moves a worker into the platform's fixed-priority realtime class
//! at the highest priority that class offers. It usually requires privilege
//! (`CAP_SYS_NICE` or an rtprio limit on Linux), so failure is expected in
//! ordinary environments and never fatal: the worker keeps its inherited
//! priority and the failure is reported at most once per invocation through a
//! [`WarnOnce`] flag.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

// -----------------------------------------------------------------------------
// Once-only warning flag

/// A one-shot trigger shared by all workers of one invocation. Many workers
/// tend to fail elevation identically at the same moment; only the first gets
/// to report it.
pub struct WarnOnce {
    fired: AtomicBool,
}

impl WarnOnce {
    /// Creates an untriggered flag.
    pub const fn new() -> WarnOnce {
        WarnOnce {
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` for exactly one caller over the flag's lifetime, no
    /// matter how many threads race on it.
    pub fn first(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for WarnOnce {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Elevation

/// Switches the calling thread to the fixed-priority realtime class
/// (`SCHED_FIFO`) at the maximum priority level that class supports.
#[cfg(target_os = "linux")]
pub fn elevate_current_thread() -> io::Result<()> {
    // SAFETY: Plain FFI. `sched_param` is fully initialized before use and
    // `pthread_self` always names the calling thread.
    unsafe {
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max == -1 {
            return Err(io::Error::last_os_error());
        }
        let param = libc::sched_param {
            sched_priority: max,
        };
        // pthread_setschedparam reports errors via its return value, not errno.
        match libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) {
            0 => Ok(()),
            errno => Err(io::Error::from_raw_os_error(errno)),
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn elevate_current_thread() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "realtime scheduling is not supported on this platform",
    ))
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn warn_once_fires_a_single_time() {
        let flag = WarnOnce::new();
        assert!(flag.first());
        assert!(!flag.first());
        assert!(!flag.first());
    }

    #[test]
    fn warn_once_admits_one_winner_across_threads() {
        let flag = WarnOnce::new();
        let mut winners = 0;

        thread::scope(|scope| {
            let handles: Vec<_> = (0..16).map(|_| scope.spawn(|| flag.first())).collect();
            for handle in handles {
                if handle.join().unwrap() {
                    winners += 1;
                }
            }
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn elevation_is_best_effort() {
        // Succeeds only with privilege; either way it must return rather
        // than panic, and an elevated thread exits immediately.
        thread::spawn(|| {
            let _ = elevate_current_thread();
        })
        .join()
        .unwrap();
    }
}
