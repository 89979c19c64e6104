//! Eligible-core resolution and worker pinning.
//!
//! The eligible set is derived from the process's own CPU affinity mask, not
//! from the machine's core count: a process that is already restricted (for
//! example by `taskset` or a container runtime) must not pin workers onto
//! cores it is not allowed to run on. The mask is read once per invocation.
//! When it cannot be read the resolver degrades to the online processor
//! count, and to a single core if that fails too. A process restricted by
//! means the mask does not reflect will then oversubscribe rather than fail.

use log::warn;

// -----------------------------------------------------------------------------
// Eligible core set

/// The logical CPU ids the calling process may currently run on, ascending.
///
/// Used to bound the effective worker count when pinning is requested, and to
/// assign each worker ordinal a core round-robin.
#[derive(Clone, Debug)]
pub struct AffinitySet {
    cores: Vec<usize>,
}

impl AffinitySet {
    /// Snapshots the process affinity mask. The returned set is never empty.
    pub fn current() -> AffinitySet {
        let cores = process_mask().unwrap_or_else(|| {
            let online = std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1);
            (0..online).collect()
        });
        AffinitySet { cores }
    }

    /// Number of eligible cores. Always at least 1.
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Present for completeness; `current` never produces an empty set.
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// The core assigned to worker `ordinal`: entry `ordinal mod len` of the
    /// eligible list.
    pub fn core_for(&self, ordinal: usize) -> usize {
        self.cores[ordinal % self.cores.len()]
    }

    /// The raw id list, ascending.
    pub fn cores(&self) -> &[usize] {
        &self.cores
    }
}

/// Enumerates the ids set in the process affinity mask, ascending. `None`
/// when the mask cannot be read (or on platforms without one).
#[cfg(target_os = "linux")]
fn process_mask() -> Option<Vec<usize>> {
    use std::mem;

    // SAFETY: A zeroed `cpu_set_t` is a valid (empty) set, and the pointer
    // and length describe it for the duration of each call. Pid 0 addresses
    // the calling process.
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        if libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return None;
        }
        let cores: Vec<usize> = (0..libc::CPU_SETSIZE as usize)
            .filter(|&id| libc::CPU_ISSET(id, &set))
            .collect();
        (!cores.is_empty()).then_some(cores)
    }
}

#[cfg(not(target_os = "linux"))]
fn process_mask() -> Option<Vec<usize>> {
    None
}

// -----------------------------------------------------------------------------
// Pinning

/// Constrains the calling thread to a single core. Failure leaves the thread
/// floating on its inherited mask and is reported as a warning; throughput is
/// preferred over strict placement.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) {
    use std::mem;

    // SAFETY: The one-bit set is fully initialized before the call, and pid 0
    // addresses the calling thread.
    let rc = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if rc != 0 {
        let err = std::io::Error::last_os_error();
        warn!("failed to pin worker to core {core}, continuing unpinned: {err}");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(core: usize) {
    warn!("core pinning is not supported on this platform (requested core {core})");
}

// -----------------------------------------------------------------------------
// Tests
