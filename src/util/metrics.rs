//! Call and request performance metrics.
//!
//! [`PerformanceMetrics`] aggregates per-function timings and per-request
//! (`METHOD:URL`) timings with a status code histogram. All counters live
//! behind one `parking_lot::Mutex`; snapshots are cheap copies so reports can
//! be taken while instrumentation continues on other threads.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Aggregated timing statistics for one function or request key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    /// Number of recorded calls.
    pub calls: u64,
    /// Number of calls that ended in an error.
    pub errors: u64,
    /// Sum of all durations.
    pub total: Duration,
    /// Shortest observed duration.
    pub min: Duration,
    /// Longest observed duration.
    pub max: Duration,
}

impl CallStats {
    fn record(&mut self, elapsed: Duration, success: bool) {
        if self.calls == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.calls += 1;
        self.total += elapsed;
        if !success {
            self.errors += 1;
        }
    }

    /// Average duration, zero when nothing was recorded.
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Request statistics: call timings plus a status code histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    /// Timing statistics.
    #[serde(flatten)]
    pub timing: CallStats,
    /// Count of responses per HTTP status code.
    pub status_codes: BTreeMap<u16, u64>,
}

/// Report entry with the derived average included.
#[derive(Debug, Clone, Serialize)]
pub struct StatsEntry<S> {
    /// Raw statistics.
    #[serde(flatten)]
    pub stats: S,
    /// Average duration in milliseconds.
    pub avg_ms: f64,
}

/// Totals across every tracked key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    /// Distinct function names tracked.
    pub tracked_functions: usize,
    /// Distinct request keys tracked.
    pub tracked_requests: usize,
    /// Total function calls.
    pub total_function_calls: u64,
    /// Total HTTP requests.
    pub total_requests: u64,
    /// Total errors across functions and requests.
    pub total_errors: u64,
}

/// Read-only snapshot returned by [`PerformanceMetrics::get_performance_report`].
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    /// Per-function statistics.
    pub functions: BTreeMap<String, StatsEntry<CallStats>>,
    /// Per-request statistics keyed by `METHOD:URL`.
    pub requests: BTreeMap<String, StatsEntry<RequestStats>>,
    /// Aggregate totals.
    pub summary: ReportSummary,
}

#[derive(Debug, Default)]
struct MetricsState {
    functions: HashMap<String, CallStats>,
    requests: HashMap<String, RequestStats>,
}

/// Thread-safe collector for function and HTTP request timings.
#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    state: Mutex<MetricsState>,
}

impl PerformanceMetrics {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call of `name`.
    pub fn record_function(&self, name: &str, elapsed: Duration, success: bool) {
        let mut state = self.state.lock();
        state
            .functions
            .entry(name.to_string())
            .or_default()
            .record(elapsed, success);
    }

    /// Record one HTTP request. `status` is `None` when no response arrived.
    pub fn record_request(
        &self,
        method: &str,
        url: &str,
        elapsed: Duration,
        status: Option<u16>,
        success: bool,
    ) {
        let key = format!("{}:{url}", method.to_uppercase());
        let mut state = self.state.lock();
        let entry = state.requests.entry(key).or_default();
        entry.timing.record(elapsed, success);
        if let Some(code) = status {
            *entry.status_codes.entry(code).or_default() += 1;
        }
    }

    /// Time a blocking closure returning `Result`, recording an error on `Err`.
    pub fn measure<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let start = Instant::now();
        let result = f();
        self.record_function(name, start.elapsed(), result.is_ok());
        result
    }

    /// Time a future returning `Result`, recording an error on `Err`.
    pub async fn measure_async<T, E, Fut>(&self, name: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.record_function(name, start.elapsed(), result.is_ok());
        result
    }

    /// Statistics for a single function, if it was ever recorded.
    #[must_use]
    pub fn function_stats(&self, name: &str) -> Option<CallStats> {
        self.state.lock().functions.get(name).cloned()
    }

    /// Statistics for a single `METHOD:URL` key.
    #[must_use]
    pub fn request_stats(&self, method: &str, url: &str) -> Option<RequestStats> {
        let key = format!("{}:{url}", method.to_uppercase());
        self.state.lock().requests.get(&key).cloned()
    }

    /// Functions whose average duration exceeds `threshold`, slowest first.
    #[must_use]
    pub fn get_slow_functions(&self, threshold: Duration) -> Vec<(String, Duration)> {
        let mut slow: Vec<(String, Duration)> = {
            let state = self.state.lock();
            state
                .functions
                .iter()
                .map(|(name, stats)| (name.clone(), stats.average()))
                .filter(|(_, avg)| *avg > threshold)
                .collect()
        };
        slow.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        slow
    }

    /// Snapshot of every tracked function and request.
    #[must_use]
    pub fn get_performance_report(&self) -> PerformanceReport {
        let (functions, requests) = {
            let state = self.state.lock();
            (state.functions.clone(), state.requests.clone())
        };

        let mut summary = ReportSummary {
            tracked_functions: functions.len(),
            tracked_requests: requests.len(),
            ..ReportSummary::default()
        };
        for stats in functions.values() {
            summary.total_function_calls += stats.calls;
            summary.total_errors += stats.errors;
        }
        for stats in requests.values() {
            summary.total_requests += stats.timing.calls;
            summary.total_errors += stats.timing.errors;
        }

        PerformanceReport {
            functions: functions
                .into_iter()
                .map(|(name, stats)| {
                    let avg_ms = stats.average().as_secs_f64() * 1000.0;
                    (name, StatsEntry { stats, avg_ms })
                })
                .collect(),
            requests: requests
                .into_iter()
                .map(|(key, stats)| {
                    let avg_ms = stats.timing.average().as_secs_f64() * 1000.0;
                    (key, StatsEntry { stats, avg_ms })
                })
                .collect(),
            summary,
        }
    }

    /// Drop all recorded statistics.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.functions.clear();
        state.requests.clear();
    }
}
