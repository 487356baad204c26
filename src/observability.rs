//! Operation metrics and TTL policies.
//!
//! # Metrics
//!
//! [`MetricsRecorder`] tracks every upstream call: when it started, how many
//! other calls were in flight at that moment, how long it took and whether it
//! failed. Finished calls go into a bounded history (oldest dropped first) and
//! all statistics are computed on demand from that history.
//!
//! Prefer the scoped form over raw `start`/`end` pairs. The guard records a
//! failure if it is dropped before being finished, which covers early returns
//! and cancelled futures:
//!
//! ```
//! use hotel_kit::observability::MetricsRecorder;
//!
//! # async fn example() {
//! let recorder = MetricsRecorder::new(1000);
//!
//! let result: hotel_kit::Result<u32> = recorder
//!     .instrument("hotels_by_location", async { Ok(3) })
//!     .await;
//! assert!(result.is_ok());
//!
//! let stats = recorder.stats(Some("hotels_by_location"));
//! assert_eq!(stats.total_operations, 1);
//! # }
//! ```
//!
//! Recording never fails: an unknown operation id is logged and ignored, and
//! a poisoned lock is recovered, so measurement can never mask the outcome of
//! the call being measured.
//!
//! # TTL Policies
//!
//! | Policy | Use Case |
//! |--------|----------|
//! | `Default` | Use the store's default TTL |
//! | `Fixed` | Same lifetime for every operation |
//! | `PerOperation` | Offers expire faster than hotel lists |

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::Result;

/// Identifier returned by [`MetricsRecorder::start`].
pub type OperationId = u64;

/// Error recorded for operations whose guard was dropped unfinished.
pub const CANCELLED: &str = "cancelled before completion";

/// Metrics for a single operation.
#[derive(Clone, Debug)]
pub struct OperationMetric {
    pub id: OperationId,
    pub name: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub success: bool,
    pub error: Option<String>,
    /// Operations already in flight when this one started.
    pub concurrency_at_start: usize,
}

impl OperationMetric {
    /// Elapsed time, once finished.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .map(|end| end.saturating_duration_since(self.start_time))
    }
}

/// Aggregated statistics over finished operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerformanceStats {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub total_duration: Duration,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub avg_duration: Duration,
    pub median_duration: Duration,
    pub p95_duration: Duration,
    pub p99_duration: Duration,
    pub concurrency_avg: f64,
    pub concurrency_max: usize,
    pub error_rate: f64,
    pub throughput_per_second: f64,
}

/// Per-operation figures in a [`MetricsSummary`].
#[derive(Clone, Debug, Serialize)]
pub struct OperationBreakdown {
    pub total_operations: usize,
    /// Percentage, 0-100.
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p95_duration_ms: f64,
    /// Percentage, 0-100.
    pub error_rate: f64,
    pub throughput_per_second: f64,
}

/// Snapshot of everything the recorder knows.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSummary {
    /// Operations started since the last history clear.
    pub total_operations: u64,
    pub operation_types: BTreeMap<String, u64>,
    pub error_counts: BTreeMap<String, u64>,
    pub active_operations: usize,
    pub uptime_seconds: f64,
    pub metrics_history_size: usize,
    pub operation_stats: BTreeMap<String, OperationBreakdown>,
}

struct RecorderState {
    active: HashMap<OperationId, OperationMetric>,
    history: VecDeque<OperationMetric>,
    started_at: Instant,
}

/// Records start/end of named operations and aggregates them.
pub struct MetricsRecorder {
    state: Mutex<RecorderState>,
    started: DashMap<String, u64>,
    failed: DashMap<String, u64>,
    next_id: AtomicU64,
    capacity: usize,
}

impl MetricsRecorder {
    /// Create a recorder keeping at most `history_capacity` finished operations.
    pub fn new(history_capacity: usize) -> Self {
        MetricsRecorder {
            state: Mutex::new(RecorderState {
                active: HashMap::new(),
                history: VecDeque::with_capacity(history_capacity.min(4096)),
                started_at: Instant::now(),
            }),
            started: DashMap::new(),
            failed: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: history_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Begin tracking an operation.
    pub fn start(&self, name: &str) -> OperationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let concurrency = {
            let mut state = self.lock();
            let concurrency = state.active.len();
            state.active.insert(
                id,
                OperationMetric {
                    id,
                    name: name.to_string(),
                    start_time: Instant::now(),
                    end_time: None,
                    success: false,
                    error: None,
                    concurrency_at_start: concurrency,
                },
            );
            concurrency
        };
        *self.started.entry(name.to_string()).or_insert(0) += 1;

        debug!(
            "Started operation {} ({}) with {} in flight",
            id, name, concurrency
        );
        id
    }

    /// Finish tracking an operation and move it into history.
    ///
    /// Unknown ids are logged and ignored.
    pub fn end(&self, id: OperationId, success: bool, error: Option<String>) {
        let finished = {
            let mut state = self.lock();
            let Some(mut metric) = state.active.remove(&id) else {
                drop(state);
                warn!("Operation {} not found in active operations", id);
                return;
            };

            metric.end_time = Some(Instant::now());
            metric.success = success;
            metric.error = error;

            let summary = (metric.name.clone(), metric.duration());
            state.history.push_back(metric);
            while state.history.len() > self.capacity {
                state.history.pop_front();
            }
            summary
        };

        let (name, duration) = finished;
        if !success {
            *self.failed.entry(name.clone()).or_insert(0) += 1;
        }

        debug!(
            "Completed operation {} ({}) in {:?} - {}",
            id,
            name,
            duration.unwrap_or_default(),
            if success { "success" } else { "failed" }
        );
    }

    /// Begin a scoped operation that is closed when the guard is finished or dropped.
    pub fn track(&self, name: &str) -> OperationGuard<'_> {
        OperationGuard {
            recorder: self,
            id: self.start(name),
            finished: false,
        }
    }

    /// Await `future` as a tracked operation, recording its outcome.
    pub async fn instrument<T, Fut>(&self, name: &str, future: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.track(name);
        let result = future.await;
        guard.finish(&result);
        result
    }

    /// Number of started but unfinished operations.
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Snapshot of in-flight operations, oldest first.
    pub fn active_operations(&self) -> Vec<OperationMetric> {
        let mut active: Vec<OperationMetric> = self.lock().active.values().cloned().collect();
        active.sort_by_key(|metric| metric.id);
        active
    }

    /// The last `limit` finished operations in completion order.
    pub fn recent_operations(&self, limit: usize) -> Vec<OperationMetric> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Time since construction or the last [`clear_history`](Self::clear_history).
    pub fn uptime(&self) -> Duration {
        self.lock().started_at.elapsed()
    }

    /// Aggregate statistics over history, optionally for one operation name.
    pub fn stats(&self, name: Option<&str>) -> PerformanceStats {
        let (samples, uptime) = {
            let state = self.lock();
            let samples: Vec<(Option<Duration>, bool, usize)> = state
                .history
                .iter()
                .filter(|metric| name.map_or(true, |n| metric.name == n))
                .map(|metric| (metric.duration(), metric.success, metric.concurrency_at_start))
                .collect();
            (samples, state.started_at.elapsed())
        };

        compute_stats(&samples, uptime)
    }

    /// Per-operation breakdown plus global counters.
    pub fn summary(&self) -> MetricsSummary {
        let operation_types: BTreeMap<String, u64> = self
            .started
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let error_counts: BTreeMap<String, u64> = self
            .failed
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        let operation_stats = operation_types
            .keys()
            .map(|name| {
                let stats = self.stats(Some(name));
                let success_rate = if stats.total_operations > 0 {
                    stats.successful_operations as f64 / stats.total_operations as f64 * 100.0
                } else {
                    0.0
                };
                (
                    name.clone(),
                    OperationBreakdown {
                        total_operations: stats.total_operations,
                        success_rate,
                        avg_duration_ms: as_millis(stats.avg_duration),
                        max_duration_ms: as_millis(stats.max_duration),
                        p95_duration_ms: as_millis(stats.p95_duration),
                        error_rate: stats.error_rate * 100.0,
                        throughput_per_second: stats.throughput_per_second,
                    },
                )
            })
            .collect();

        let (active_operations, uptime, history_size) = {
            let state = self.lock();
            (
                state.active.len(),
                state.started_at.elapsed(),
                state.history.len(),
            )
        };

        MetricsSummary {
            total_operations: operation_types.values().sum(),
            operation_types,
            error_counts,
            active_operations,
            uptime_seconds: uptime.as_secs_f64(),
            metrics_history_size: history_size,
            operation_stats,
        }
    }

    /// Drop finished history and counters, and restart the uptime clock.
    ///
    /// In-flight operations are kept and land in the fresh history when they end.
    pub fn clear_history(&self) {
        {
            let mut state = self.lock();
            state.history.clear();
            state.started_at = Instant::now();
        }
        self.started.clear();
        self.failed.clear();
        info!("Metrics history cleared");
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn as_millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn percentile(sorted: &[Duration], fraction: f64) -> Duration {
    let index = (sorted.len() as f64 * fraction) as usize;
    sorted[index.min(sorted.len() - 1)]
}

fn median(sorted: &[Duration]) -> Duration {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}

fn compute_stats(
    samples: &[(Option<Duration>, bool, usize)],
    uptime: Duration,
) -> PerformanceStats {
    if samples.is_empty() {
        return PerformanceStats::default();
    }

    let total = samples.len();
    let successful = samples.iter().filter(|(_, success, _)| *success).count();
    let failed = total - successful;

    let concurrency_max = samples.iter().map(|(_, _, c)| *c).max().unwrap_or(0);
    let concurrency_avg =
        samples.iter().map(|(_, _, c)| *c as f64).sum::<f64>() / total as f64;

    let uptime_secs = uptime.as_secs_f64();
    let throughput = if uptime_secs > 0.0 {
        total as f64 / uptime_secs
    } else {
        0.0
    };

    let mut durations: Vec<Duration> = samples.iter().filter_map(|(d, _, _)| *d).collect();
    durations.sort();

    let mut stats = PerformanceStats {
        total_operations: total,
        successful_operations: successful,
        failed_operations: failed,
        concurrency_avg,
        concurrency_max,
        error_rate: failed as f64 / total as f64,
        throughput_per_second: throughput,
        ..PerformanceStats::default()
    };

    if let (Some(min), Some(max)) = (durations.first(), durations.last()) {
        let sum: Duration = durations.iter().sum();
        stats.total_duration = sum;
        stats.min_duration = *min;
        stats.max_duration = *max;
        stats.avg_duration = sum / durations.len() as u32;
        stats.median_duration = median(&durations);
        stats.p95_duration = percentile(&durations, 0.95);
        stats.p99_duration = percentile(&durations, 0.99);
    }

    stats
}

/// Scoped operation tracker.
///
/// Call [`succeed`](Self::succeed), [`fail`](Self::fail) or
/// [`finish`](Self::finish). Dropping an unfinished guard records a failure
/// with [`CANCELLED`].
pub struct OperationGuard<'a> {
    recorder: &'a MetricsRecorder,
    id: OperationId,
    finished: bool,
}

impl OperationGuard<'_> {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn succeed(mut self) {
        self.finished = true;
        self.recorder.end(self.id, true, None);
    }

    pub fn fail(mut self, error: &dyn Display) {
        self.finished = true;
        self.recorder.end(self.id, false, Some(error.to_string()));
    }

    /// Record the outcome of `result`.
    pub fn finish<T>(self, result: &Result<T>) {
        match result {
            Ok(_) => self.succeed(),
            Err(e) => self.fail(e),
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.recorder
                .end(self.id, false, Some(CANCELLED.to_string()));
        }
    }
}

/// TTL (Time-to-Live) policy for cached responses.
#[derive(Clone, Debug, Default)]
pub enum TtlPolicy {
    /// Use the store's default TTL
    #[default]
    Default,

    /// Fixed duration for all operations
    Fixed(Duration),

    /// Duration chosen by operation name
    PerOperation(fn(&str) -> Duration),
}

impl TtlPolicy {
    /// TTL for an operation; `None` defers to the store default.
    pub fn get_ttl(&self, operation: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Default => None,
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::PerOperation(f) => Some(f(operation)),
        }
    }
}
