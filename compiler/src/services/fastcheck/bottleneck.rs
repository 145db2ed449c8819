//! Bottleneck analysis over engine statistics.
//!
//! Flags the dominant slow axis (memory pressure, cache miss rate,
//! thread utilization, per-file time) and suggests mitigation tags. The
//! performance budgets themselves live with the callers; this module
//! only ranks what the counters show.

use serde::{Deserialize, Serialize};

use super::EngineStatistics;

/// Cold single-file budget, in milliseconds.
pub const SINGLE_FILE_BUDGET_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BottleneckAxis {
    Memory,
    CacheMisses,
    ThreadUtilization,
    PerFileTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub axis: BottleneckAxis,
    /// 0.0..=1.0; higher is worse.
    pub severity: f64,
    pub detail: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub dominant: Option<BottleneckAxis>,
    pub findings: Vec<Finding>,
}

/// Rank the engine's counters into a bottleneck report. Findings are
/// sorted most severe first.
pub fn analyze_bottlenecks(stats: &EngineStatistics) -> BottleneckReport {
    let mut findings = Vec::new();

    if stats.memory_budget > 0 {
        let usage = stats.cache.memory_used as f64 / stats.memory_budget as f64;
        if usage > 0.8 {
            findings.push(Finding {
                axis: BottleneckAxis::Memory,
                severity: usage.min(1.0),
                detail: format!(
                    "cache uses {:.0}% of its {} byte budget",
                    usage * 100.0,
                    stats.memory_budget
                ),
                mitigation: "raise the cache memory budget or shorten the TTL".to_string(),
            });
        }
    }

    let lookups = stats.cache.hits + stats.cache.misses;
    if lookups >= 10 {
        let miss_rate = stats.cache.misses as f64 / lookups as f64;
        if miss_rate > 0.5 {
            findings.push(Finding {
                axis: BottleneckAxis::CacheMisses,
                severity: miss_rate,
                detail: format!("cache miss rate is {:.0}%", miss_rate * 100.0),
                mitigation: "check for files rewritten with identical content or clock skew"
                    .to_string(),
            });
        }
    }

    if stats.worker_threads > 1 && stats.thread_utilization < 0.5 {
        findings.push(Finding {
            axis: BottleneckAxis::ThreadUtilization,
            severity: 1.0 - stats.thread_utilization,
            detail: format!(
                "workers are {:.0}% utilized across {} threads",
                stats.thread_utilization * 100.0,
                stats.worker_threads
            ),
            mitigation: "batch more files per project check or reduce the pool size".to_string(),
        });
    }

    if stats.avg_file_ms > SINGLE_FILE_BUDGET_MS {
        findings.push(Finding {
            axis: BottleneckAxis::PerFileTime,
            severity: (stats.avg_file_ms / (4.0 * SINGLE_FILE_BUDGET_MS)).min(1.0),
            detail: format!("average cold analysis takes {:.1}ms per file", stats.avg_file_ms),
            mitigation: "split oversized source files or profile the analyzer passes".to_string(),
        });
    }

    findings.sort_by(|a, b| {
        b.severity
            .partial_cmp(&a.severity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    BottleneckReport {
        dominant: findings.first().map(|f| f.axis),
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fastcheck::CacheStatsSnapshot;

    fn stats() -> EngineStatistics {
        EngineStatistics {
            files_checked: 100,
            cache: CacheStatsSnapshot {
                hits: 80,
                misses: 20,
                total_checks: 100,
                total_analysis_ms: 400,
                evictions: 0,
                memory_used: 1024,
            },
            memory_budget: 64 * 1024 * 1024,
            worker_threads: 8,
            avg_file_ms: 20.0,
            thread_utilization: 0.9,
        }
    }

    #[test]
    fn healthy_stats_produce_no_findings() {
        let report = analyze_bottlenecks(&stats());
        assert!(report.dominant.is_none());
        assert!(report.findings.is_empty());
    }

    #[test]
    fn high_miss_rate_is_flagged() {
        let mut stats = stats();
        stats.cache.hits = 10;
        stats.cache.misses = 90;
        let report = analyze_bottlenecks(&stats);
        assert_eq!(report.dominant, Some(BottleneckAxis::CacheMisses));
    }

    #[test]
    fn memory_pressure_dominates_when_most_severe() {
        let mut stats = stats();
        stats.cache.memory_used = stats.memory_budget - 1;
        stats.avg_file_ms = 110.0;
        let report = analyze_bottlenecks(&stats);
        assert_eq!(report.dominant, Some(BottleneckAxis::Memory));
        assert!(report.findings.len() >= 2);
    }

    #[test]
    fn slow_files_are_flagged_with_mitigation() {
        let mut stats = stats();
        stats.avg_file_ms = 250.0;
        let report = analyze_bottlenecks(&stats);
        assert_eq!(report.dominant, Some(BottleneckAxis::PerFileTime));
        assert!(!report.findings[0].mitigation.is_empty());
    }
}
