//! Zone-tracked allocation.
//!
//! Every allocation carries its memory zone as metadata; the zone is
//! invariant for the allocation's lifetime. Freeing a gc-zone pointer is
//! a hint (the collector owns the real decision); this runtime honors
//! the hint eagerly. Pinned-zone pointers never move while allocated,
//! which this allocator satisfies trivially by never moving anything.

use std::alloc::{alloc, dealloc, Layout};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::models::error::RuntimeError;
use crate::models::ownership::MemoryZone;

use super::stats;

struct AllocationRecord {
    layout: Layout,
    zone: MemoryZone,
}

/// Explicit allocator context. Not a global: callers own their zones.
pub struct ZoneAllocator {
    ledger: Mutex<FxHashMap<usize, AllocationRecord>>,
}

impl ZoneAllocator {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn alloc(&self, size: usize, zone: MemoryZone) -> Result<*mut u8, RuntimeError> {
        if size == 0 {
            return Err(RuntimeError::AllocationFailed {
                size,
                zone: zone.as_str(),
            });
        }
        let layout = Layout::from_size_align(size, 8).map_err(|_| RuntimeError::AllocationFailed {
            size,
            zone: zone.as_str(),
        })?;

        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(RuntimeError::AllocationFailed {
                size,
                zone: zone.as_str(),
            });
        }

        self.ledger
            .lock()
            .insert(ptr as usize, AllocationRecord { layout, zone });
        stats::global().record_allocation(size);
        Ok(ptr)
    }

    /// Release an allocation. The zone must match the one recorded at
    /// allocation time; for the gc zone the call is a hint and never
    /// fails on mismatch.
    pub fn free(&self, ptr: *mut u8, zone: MemoryZone) -> Result<(), RuntimeError> {
        let record = self.ledger.lock().remove(&(ptr as usize));
        let Some(record) = record else {
            return Err(RuntimeError::AllocationFailed {
                size: 0,
                zone: zone.as_str(),
            });
        };

        if record.zone != zone && record.zone != MemoryZone::Gc {
            // Put the record back; the caller got the zone wrong.
            self.ledger
                .lock()
                .insert(ptr as usize, AllocationRecord { ..record });
            return Err(RuntimeError::AllocationFailed {
                size: record.layout.size(),
                zone: zone.as_str(),
            });
        }

        stats::global().record_deallocation(record.layout.size());
        unsafe { dealloc(ptr, record.layout) };
        Ok(())
    }

    /// Zone recorded for a live allocation.
    pub fn zone_of(&self, ptr: *mut u8) -> Option<MemoryZone> {
        self.ledger.lock().get(&(ptr as usize)).map(|r| r.zone)
    }

    pub fn live_allocations(&self) -> usize {
        self.ledger.lock().len()
    }
}

impl Default for ZoneAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ZoneAllocator {
    fn drop(&mut self) {
        // Release anything still live so a dropped context cannot leak.
        let ledger = std::mem::take(&mut *self.ledger.lock());
        for (ptr, record) in ledger {
            stats::global().record_deallocation(record.layout.size());
            unsafe { dealloc(ptr as *mut u8, record.layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trip() {
        let allocator = ZoneAllocator::new();
        let ptr = allocator.alloc(64, MemoryZone::Manual).unwrap();
        assert_eq!(allocator.zone_of(ptr), Some(MemoryZone::Manual));
        assert_eq!(allocator.live_allocations(), 1);

        allocator.free(ptr, MemoryZone::Manual).unwrap();
        assert_eq!(allocator.live_allocations(), 0);
    }

    #[test]
    fn zone_is_invariant_for_the_allocation() {
        let allocator = ZoneAllocator::new();
        let ptr = allocator.alloc(16, MemoryZone::Pinned).unwrap();

        let err = allocator.free(ptr, MemoryZone::Manual).unwrap_err();
        assert!(matches!(err, RuntimeError::AllocationFailed { .. }));
        // The allocation survives the failed free.
        assert_eq!(allocator.zone_of(ptr), Some(MemoryZone::Pinned));

        allocator.free(ptr, MemoryZone::Pinned).unwrap();
    }

    #[test]
    fn gc_zone_free_is_a_hint() {
        let allocator = ZoneAllocator::new();
        let ptr = allocator.alloc(16, MemoryZone::Gc).unwrap();
        // Freeing gc memory under any zone label succeeds.
        allocator.free(ptr, MemoryZone::Stack).unwrap();
    }

    #[test]
    fn zero_sized_allocations_are_rejected() {
        let allocator = ZoneAllocator::new();
        assert!(allocator.alloc(0, MemoryZone::Gc).is_err());
    }

    #[test]
    fn double_free_is_an_error() {
        let allocator = ZoneAllocator::new();
        let ptr = allocator.alloc(8, MemoryZone::Manual).unwrap();
        allocator.free(ptr, MemoryZone::Manual).unwrap();
        assert!(allocator.free(ptr, MemoryZone::Manual).is_err());
    }
}
