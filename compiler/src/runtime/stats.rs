//! Process-wide atomic runtime statistics.
//!
//! Field order is FFI-visible and must stay stable. All counters are
//! monotonic and use relaxed ordering; only the peak-memory update uses
//! acquire-release, since it is a read-modify-write race with itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;

#[repr(C)]
#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub total_allocations: AtomicU64,
    pub total_deallocations: AtomicU64,
    pub current_memory: AtomicU64,
    pub peak_memory: AtomicU64,
    pub gc_collections: AtomicU64,
    pub gc_time_ms: AtomicU64,
    pub tasks_spawned: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub ffi_calls: AtomicU64,
}

/// Plain-value copy of the counters, in the same stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_allocations: u64,
    pub total_deallocations: u64,
    pub current_memory: u64,
    pub peak_memory: u64,
    pub gc_collections: u64,
    pub gc_time_ms: u64,
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    pub ffi_calls: u64,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocation(&self, size: usize) {
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        let current = self
            .current_memory
            .fetch_add(size as u64, Ordering::Relaxed)
            + size as u64;
        self.update_peak(current);
    }

    pub fn record_deallocation(&self, size: usize) {
        self.total_deallocations.fetch_add(1, Ordering::Relaxed);
        self.current_memory
            .fetch_sub(size as u64, Ordering::Relaxed);
    }

    fn update_peak(&self, current: u64) {
        let mut peak = self.peak_memory.load(Ordering::Acquire);
        while current > peak {
            match self.peak_memory.compare_exchange_weak(
                peak,
                current,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }

    pub fn record_gc(&self, elapsed: Duration) {
        self.gc_collections.fetch_add(1, Ordering::Relaxed);
        self.gc_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_task_spawned(&self) {
        self.tasks_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ffi_call(&self) {
        self.ffi_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_deallocations: self.total_deallocations.load(Ordering::Relaxed),
            current_memory: self.current_memory.load(Ordering::Relaxed),
            peak_memory: self.peak_memory.load(Ordering::Relaxed),
            gc_collections: self.gc_collections.load(Ordering::Relaxed),
            gc_time_ms: self.gc_time_ms.load(Ordering::Relaxed),
            tasks_spawned: self.tasks_spawned.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            ffi_calls: self.ffi_calls.load(Ordering::Relaxed),
        }
    }
}

static GLOBAL_STATS: OnceCell<RuntimeStats> = OnceCell::new();

/// Initialize the process-wide statistics bag. Idempotent; called from
/// runtime startup.
pub fn init() -> &'static RuntimeStats {
    GLOBAL_STATS.get_or_init(RuntimeStats::new)
}

/// The process-wide statistics bag, initializing on first use.
pub fn global() -> &'static RuntimeStats {
    init()
}

/// Runtime shutdown hook: log the final counters. The storage itself is
/// static and outlives the call.
pub fn shutdown() {
    if let Some(stats) = GLOBAL_STATS.get() {
        let snapshot = stats.snapshot();
        info!(?snapshot, "runtime statistics at shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allocation_tracking_updates_current_and_peak() {
        let stats = RuntimeStats::new();
        stats.record_allocation(100);
        stats.record_allocation(50);
        stats.record_deallocation(100);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_allocations, 2);
        assert_eq!(snapshot.total_deallocations, 1);
        assert_eq!(snapshot.current_memory, 50);
        assert_eq!(snapshot.peak_memory, 150);
    }

    #[test]
    fn peak_is_monotonic_under_contention() {
        let stats = Arc::new(RuntimeStats::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let stats = stats.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_allocation(10);
                    stats.record_deallocation(10);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_allocations, 4000);
        assert_eq!(snapshot.current_memory, 0);
        assert!(snapshot.peak_memory >= 10);
    }

    #[test]
    fn global_is_stable_across_calls() {
        let a = global() as *const RuntimeStats;
        let b = global() as *const RuntimeStats;
        assert_eq!(a, b);
    }
}
