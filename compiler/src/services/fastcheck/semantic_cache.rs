//! Per-file semantic cache: content-hash keyed, TTL-bounded,
//! memory-capped.
//!
//! Lookups verify the file still exists with unchanged mtime and content
//! hash; any mismatch invalidates the entry and reports a miss. All
//! validation and mutation run under a single write-locked path, so a
//! racing writer can never observe a half-validated entry.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::diagnostics::Diagnostic;
use crate::utils::helpers::djb2_hash;

/// Cache tuning knobs with environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_memory_bytes: usize,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024,
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("VESPERC_CACHE_MAX_MB") {
            if let Ok(mb) = value.parse::<usize>() {
                config.max_memory_bytes = mb * 1024 * 1024;
            }
        }
        if let Ok(value) = std::env::var("VESPERC_CACHE_TTL_SECS") {
            if let Ok(secs) = value.parse() {
                config.ttl_secs = secs;
            }
        }
        if let Ok(value) = std::env::var("VESPERC_CACHE_MAX_ENTRIES") {
            if let Ok(entries) = value.parse() {
                config.max_entries = entries;
            }
        }
        config
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Cached result of analyzing one source file.
#[derive(Debug, Clone)]
pub struct SemanticCacheEntry {
    pub file_path: PathBuf,
    pub content_hash: u64,
    pub mtime: SystemTime,
    /// Module-level symbol names, in declaration order.
    pub symbols: Vec<String>,
    /// Display names of the types resolved in the file.
    pub resolved_types: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub analysis_time_ms: u64,
    pub memory_used: usize,
    pub valid: bool,
    pub created_at: Instant,
}

impl SemanticCacheEntry {
    /// Heuristic footprint of this entry in bytes.
    pub fn estimate_size(&self) -> usize {
        let strings: usize = self
            .symbols
            .iter()
            .chain(self.resolved_types.iter())
            .map(|s| s.len() + 24)
            .sum();
        let diagnostics = self.diagnostics.len() * 160;
        std::mem::size_of::<Self>() + self.file_path.as_os_str().len() + strings + diagnostics
    }
}

/// Atomic hit/miss statistics. Monotonic for the life of the cache.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    hits: AtomicU64,
    misses: AtomicU64,
    total_checks: AtomicU64,
    total_analysis_ms: AtomicU64,
    evictions: AtomicU64,
    memory_used: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_checks: u64,
    pub total_analysis_ms: u64,
    pub evictions: u64,
    pub memory_used: usize,
}

impl CacheStatistics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_check(&self) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_time(&self, elapsed: Duration) {
        self.total_analysis_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_eviction(&self, size: usize) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.memory_used.fetch_sub(size, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            total_checks: self.total_checks.load(Ordering::Relaxed),
            total_analysis_ms: self.total_analysis_ms.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memory_used: self.memory_used.load(Ordering::Relaxed),
        }
    }
}

pub struct SemanticCache {
    config: CacheConfig,
    entries: RwLock<LruCache<PathBuf, Arc<SemanticCacheEntry>>>,
    pub stats: CacheStatistics,
}

impl SemanticCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or(NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            config,
            entries: RwLock::new(LruCache::new(capacity)),
            stats: CacheStatistics::default(),
        }
    }

    /// Look up the cached analysis for `path`. Validation happens under
    /// the write lock: a stale, expired, or changed entry is removed and
    /// reported as a miss.
    pub fn get(&self, path: &Path) -> Option<Arc<SemanticCacheEntry>> {
        let mut entries = self.entries.write();

        let entry = match entries.get(path) {
            Some(entry) => entry.clone(),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if entry.created_at.elapsed() > self.config.ttl() || !self.entry_is_current(&entry) {
            if let Some(removed) = entries.pop(path) {
                self.stats.record_eviction(removed.memory_used);
            }
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        Some(entry)
    }

    /// Insert or replace the entry for a file. When the addition would
    /// exceed the memory budget, TTL cleanup runs first and LRU eviction
    /// follows until the entry fits or the cache is empty.
    pub fn put(&self, mut entry: SemanticCacheEntry) {
        entry.memory_used = entry.estimate_size();
        entry.valid = true;
        let size = entry.memory_used;
        let path = entry.file_path.clone();

        let mut entries = self.entries.write();

        if let Some(previous) = entries.pop(&path) {
            self.stats
                .memory_used
                .fetch_sub(previous.memory_used, Ordering::Relaxed);
        }

        if self.stats.memory_used.load(Ordering::Relaxed) + size > self.config.max_memory_bytes {
            self.expire_locked(&mut entries);
        }
        while self.stats.memory_used.load(Ordering::Relaxed) + size > self.config.max_memory_bytes
            && !entries.is_empty()
        {
            if let Some((_, evicted)) = entries.pop_lru() {
                self.stats.record_eviction(evicted.memory_used);
            }
        }

        self.stats.memory_used.fetch_add(size, Ordering::Relaxed);
        if let Some((_, displaced)) = entries.push(path, Arc::new(entry)) {
            // Capacity-based displacement from the LRU itself.
            self.stats.record_eviction(displaced.memory_used);
        }
    }

    /// Drop the entry for `path`, if present.
    pub fn invalidate(&self, path: &Path) {
        let mut entries = self.entries.write();
        if let Some(removed) = entries.pop(path) {
            self.stats.record_eviction(removed.memory_used);
            debug!(path = %path.display(), "cache entry invalidated");
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        while let Some((_, removed)) = entries.pop_lru() {
            self.stats.record_eviction(removed.memory_used);
        }
    }

    /// Remove every TTL-expired entry.
    pub fn expire(&self) {
        let mut entries = self.entries.write();
        self.expire_locked(&mut entries);
    }

    fn expire_locked(&self, entries: &mut LruCache<PathBuf, Arc<SemanticCacheEntry>>) {
        let ttl = self.config.ttl();
        let expired: Vec<PathBuf> = entries
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > ttl)
            .map(|(path, _)| path.clone())
            .collect();
        for path in expired {
            if let Some(removed) = entries.pop(&path) {
                self.stats.record_eviction(removed.memory_used);
            }
        }
    }

    fn entry_is_current(&self, entry: &SemanticCacheEntry) -> bool {
        let Ok(metadata) = fs::metadata(&entry.file_path) else {
            return false;
        };
        match metadata.modified() {
            Ok(mtime) if mtime == entry.mtime => {}
            _ => return false,
        }
        match fs::read(&entry.file_path) {
            Ok(bytes) => djb2_hash(&bytes) == entry.content_hash,
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn memory_used(&self) -> usize {
        self.stats.memory_used.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
