//! Incremental fast-check engine.
//!
//! One file = one task: a single control thread drives a rayon worker
//! pool sized to the CPU count, the dependency graph decides what is
//! stale, and the semantic cache answers warm checks. The graph and
//! cache reader-writer locks are the only shared synchronization; the
//! per-file pipeline itself runs lock-free.

pub mod bottleneck;
pub mod dependency_graph;
pub mod semantic_cache;
pub mod watcher;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ast::{AstKind, AstNode};
use crate::models::diagnostics::Diagnostic;
use crate::models::error::FastCheckError;
use crate::models::source::FileId;
use crate::services::pipeline::{self, PipelineOptions};
use crate::utils::helpers::djb2_hash;

pub use dependency_graph::DependencyGraph;
pub use semantic_cache::{CacheConfig, CacheStatsSnapshot, SemanticCache, SemanticCacheEntry};

#[derive(Debug, Clone)]
pub struct FastCheckConfig {
    pub cache: CacheConfig,
    pub strict: bool,
    pub no_stdlib: bool,
    /// Worker pool size; defaults to the CPU count.
    pub worker_threads: usize,
    pub watch_interval: Duration,
}

impl Default for FastCheckConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            strict: false,
            no_stdlib: false,
            worker_threads: num_cpus::get(),
            watch_interval: Duration::from_millis(500),
        }
    }
}

/// Outcome of checking one file.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    pub from_cache: bool,
    pub duration: Duration,
}

impl CheckResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Aggregate engine statistics for reporting and bottleneck analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub files_checked: u64,
    pub cache: CacheStatsSnapshot,
    pub memory_budget: usize,
    pub worker_threads: usize,
    /// Mean cold-analysis time per file, in milliseconds.
    pub avg_file_ms: f64,
    /// CPU time over wall time x workers for the last parallel run.
    pub thread_utilization: f64,
}

struct ParallelRun {
    wall: Duration,
    cpu: Duration,
}

pub struct FastCheckEngine {
    config: FastCheckConfig,
    graph: DependencyGraph,
    cache: SemanticCache,
    pool: rayon::ThreadPool,
    file_ids: RwLock<FxHashMap<PathBuf, FileId>>,
    next_file_id: AtomicU32,
    files_checked: AtomicU64,
    last_parallel: Mutex<Option<ParallelRun>>,
}

impl FastCheckEngine {
    pub fn new(config: FastCheckConfig) -> Result<Self, FastCheckError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|index| format!("fastcheck-{index}"))
            .build()
            .map_err(|err| FastCheckError::Scheduler(err.to_string()))?;

        Ok(Self {
            cache: SemanticCache::new(config.cache.clone()),
            graph: DependencyGraph::new(),
            pool,
            file_ids: RwLock::new(FxHashMap::default()),
            next_file_id: AtomicU32::new(0),
            files_checked: AtomicU64::new(0),
            last_parallel: Mutex::new(None),
            config,
        })
    }

    pub fn with_defaults() -> Result<Self, FastCheckError> {
        Self::new(FastCheckConfig::default())
    }

    /// Check one file, consulting the cache first. Warm hits skip the
    /// pipeline entirely.
    pub fn check_file(&self, path: &Path) -> Result<CheckResult, FastCheckError> {
        let start = Instant::now();
        self.cache.stats.record_check();
        self.files_checked.fetch_add(1, Ordering::Relaxed);

        let fresh = self.graph.contains(path) && !self.graph.is_stale(path);
        if fresh {
            if let Some(entry) = self.cache.get(path) {
                debug!(path = %path.display(), "fast-check cache hit");
                return Ok(CheckResult {
                    path: path.to_path_buf(),
                    diagnostics: entry.diagnostics.clone(),
                    from_cache: true,
                    duration: start.elapsed(),
                });
            }
        } else {
            self.cache.stats.record_miss();
        }

        self.check_file_cold(path, start)
    }

    fn check_file_cold(&self, path: &Path, start: Instant) -> Result<CheckResult, FastCheckError> {
        let source = pipeline::read_source(path)?;
        let file_id = self.file_id_for(path);

        let options = PipelineOptions {
            strict: self.config.strict,
            no_stdlib: self.config.no_stdlib,
        };
        let unit = pipeline::check_source(&source, file_id, &options);

        self.graph.add_file(path)?;
        self.record_imports(path, &unit.program);

        let elapsed = start.elapsed();
        self.cache.stats.record_analysis_time(elapsed);

        let metadata = fs::metadata(path)?;
        let entry = SemanticCacheEntry {
            file_path: path.to_path_buf(),
            content_hash: djb2_hash(source.as_bytes()),
            mtime: metadata.modified()?,
            symbols: unit.module_symbols(),
            resolved_types: unit.resolved_type_names(),
            diagnostics: unit.diagnostics.clone(),
            analysis_time_ms: elapsed.as_millis() as u64,
            memory_used: 0,
            valid: true,
            created_at: Instant::now(),
        };
        self.cache.put(entry);

        Ok(CheckResult {
            path: path.to_path_buf(),
            diagnostics: unit.diagnostics,
            from_cache: false,
            duration: elapsed,
        })
    }

    /// Register import edges for a freshly parsed file. Imports resolve
    /// relative to the importing file's directory.
    fn record_imports(&self, path: &Path, program: &AstNode) {
        let AstKind::Program { decls } = &program.kind else {
            return;
        };
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        for decl in decls {
            let AstKind::Import { path: import } = &decl.kind else {
                continue;
            };
            let target = base.join(import);
            if let Err(err) = self.graph.add_dependency(path, &target) {
                warn!(
                    from = %path.display(),
                    to = %target.display(),
                    %err,
                    "failed to record import dependency"
                );
            }
        }
    }

    /// Check many files on the worker pool; file order in the result
    /// matches the input.
    pub fn check_project(&self, paths: &[PathBuf]) -> Vec<Result<CheckResult, FastCheckError>> {
        let wall = Instant::now();
        let results = self
            .pool
            .install(|| paths.par_iter().map(|path| self.check_file(path)).collect::<Vec<_>>());

        let cpu: Duration = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| r.duration)
            .sum();
        *self.last_parallel.lock() = Some(ParallelRun {
            wall: wall.elapsed(),
            cpu,
        });
        results
    }

    pub fn invalidate(&self, path: &Path) {
        self.cache.invalidate(path);
    }

    pub fn statistics(&self) -> EngineStatistics {
        let cache = self.cache.stats.snapshot();
        let cold_checks = cache.misses.max(1);
        let utilization = self
            .last_parallel
            .lock()
            .as_ref()
            .map(|run| {
                let denom = run.wall.as_secs_f64() * self.config.worker_threads as f64;
                if denom > 0.0 {
                    (run.cpu.as_secs_f64() / denom).min(1.0)
                } else {
                    1.0
                }
            })
            .unwrap_or(1.0);

        EngineStatistics {
            files_checked: self.files_checked.load(Ordering::Relaxed),
            cache,
            memory_budget: self.config.cache.max_memory_bytes,
            worker_threads: self.config.worker_threads,
            avg_file_ms: cache.total_analysis_ms as f64 / cold_checks as f64,
            thread_utilization: utilization,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    pub fn config(&self) -> &FastCheckConfig {
        &self.config
    }

    fn file_id_for(&self, path: &Path) -> FileId {
        if let Some(id) = self.file_ids.read().get(path) {
            return *id;
        }
        let mut ids = self.file_ids.write();
        *ids.entry(path.to_path_buf()).or_insert_with(|| {
            FileId(self.next_file_id.fetch_add(1, Ordering::Relaxed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> FastCheckEngine {
        FastCheckEngine::new(FastCheckConfig {
            worker_threads: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn second_check_of_unchanged_file_hits_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.vsp");
        fs::write(&path, "let x: i8 = 127;").unwrap();

        let engine = engine();
        let first = engine.check_file(&path).unwrap();
        assert!(!first.from_cache);

        let second = engine.check_file(&path).unwrap();
        assert!(second.from_cache);

        let stats = engine.statistics();
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.cache.misses, 1);
    }

    #[test]
    fn editing_a_file_forces_reanalysis() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.vsp");
        fs::write(&path, "let x = 1;").unwrap();

        let engine = engine();
        engine.check_file(&path).unwrap();

        fs::write(&path, "let x = 2;").unwrap();
        let result = engine.check_file(&path).unwrap();
        assert!(!result.from_cache);
    }

    #[test]
    fn diagnostics_survive_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.vsp");
        fs::write(&path, "let x: i8 = 128;").unwrap();

        let engine = engine();
        let first = engine.check_file(&path).unwrap();
        assert!(first.has_errors());

        let second = engine.check_file(&path).unwrap();
        assert!(second.from_cache);
        assert!(second.has_errors());
    }

    #[test]
    fn imports_create_dependency_edges() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib.vsp");
        fs::write(&lib, "pub const ANSWER: i32 = 42;").unwrap();
        let main = dir.path().join("main.vsp");
        fs::write(&main, "import \"lib.vsp\";\nlet x = 1;").unwrap();

        let engine = engine();
        engine.check_file(&main).unwrap();

        assert_eq!(engine.graph().deps_of(&main), vec![lib.clone()]);
        assert!(engine.graph().edges_are_symmetric());

        // Touching the dependency makes the dependent stale.
        fs::write(&lib, "pub const ANSWER: i32 = 43;").unwrap();
        assert!(engine.graph().is_stale(&main));
        let again = engine.check_file(&main).unwrap();
        assert!(!again.from_cache);
    }

    #[test]
    fn project_check_covers_all_files() {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..12 {
            let path = dir.path().join(format!("m{i}.vsp"));
            fs::write(&path, format!("let v{i} = {i};")).unwrap();
            paths.push(path);
        }

        let engine = engine();
        let results = engine.check_project(&paths);
        assert_eq!(results.len(), paths.len());
        assert!(results.iter().all(|r| r.is_ok()));

        let stats = engine.statistics();
        assert_eq!(stats.files_checked, paths.len() as u64);
        assert!(stats.thread_utilization > 0.0);
    }
}
