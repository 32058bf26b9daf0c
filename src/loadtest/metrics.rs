//! HdrHistogram-based metrics pipeline with coordinated omission correction.
//!
//! Provides [`MetricsRecorder`] for recording request latency samples into
//! separate success/error HdrHistogram buckets, with per-task and
//! per-endpoint breakdowns. Coordinated omission correction is applied at
//! recording time via [`hdrhistogram::Histogram::record_correct`].
//!
//! # Design
//!
//! - **Single-owner**: No `Arc<Mutex>`. Virtual users send [`MetricEvent`]s
//!   through an mpsc channel to the one task that owns the recorder.
//! - **Separate buckets**: Success and error latencies are tracked in independent
//!   histograms so error spikes don't pollute success percentiles.
//! - **Logical counts**: Request counts come from plain counters, not from
//!   histogram lengths, so synthetic fill-ins never inflate throughput.
//! - **Millisecond resolution**: Matches how users think about latency.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use crate::loadtest::error::RequestError;

/// A single request measurement.
///
/// Created via [`RequestSample::success`] or [`RequestSample::error`].
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// Name of the task whose iteration issued the request.
    pub task: String,
    /// Relative request name, e.g. `/rest?titel=a`.
    pub endpoint: String,
    /// Wall-clock duration of the request including body read.
    pub duration: Duration,
    /// `Ok(())` for success, `Err(RequestError)` for failure.
    pub result: Result<(), RequestError>,
    /// When the sample was taken.
    pub timestamp: Instant,
}

impl RequestSample {
    /// Create a success sample with the current timestamp.
    pub fn success(task: impl Into<String>, endpoint: impl Into<String>, duration: Duration) -> Self {
        Self {
            task: task.into(),
            endpoint: endpoint.into(),
            duration,
            result: Ok(()),
            timestamp: Instant::now(),
        }
    }

    /// Create an error sample with the current timestamp.
    pub fn error(
        task: impl Into<String>,
        endpoint: impl Into<String>,
        duration: Duration,
        err: RequestError,
    ) -> Self {
        Self {
            task: task.into(),
            endpoint: endpoint.into(),
            duration,
            result: Err(err),
            timestamp: Instant::now(),
        }
    }

    /// Returns `true` if the request succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of one whole iteration of a task.
#[derive(Debug, Clone)]
pub struct IterationSample {
    /// Name of the selected task.
    pub task: String,
    /// Wall-clock duration of all sub-requests together.
    pub duration: Duration,
    /// Number of sub-requests actually issued.
    pub requests: u32,
    /// `true` if the global stop interrupted the iteration.
    pub abandoned: bool,
    /// When the iteration finished.
    pub timestamp: Instant,
}

impl IterationSample {
    /// Create an iteration sample with the current timestamp.
    pub fn new(task: impl Into<String>, duration: Duration, requests: u32, abandoned: bool) -> Self {
        Self {
            task: task.into(),
            duration,
            requests,
            abandoned,
            timestamp: Instant::now(),
        }
    }
}

/// Event sent from a virtual user to the metrics aggregator.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    /// One HTTP request completed.
    Request(RequestSample),
    /// One iteration finished or was abandoned.
    Iteration(IterationSample),
}

impl MetricEvent {
    /// When the event was produced.
    pub fn timestamp(&self) -> Instant {
        match self {
            Self::Request(s) => s.timestamp,
            Self::Iteration(s) => s.timestamp,
        }
    }
}

impl From<RequestSample> for MetricEvent {
    fn from(sample: RequestSample) -> Self {
        Self::Request(sample)
    }
}

impl From<IterationSample> for MetricEvent {
    fn from(sample: IterationSample) -> Self {
        Self::Iteration(sample)
    }
}

/// Per-task snapshot: iteration counts and iteration latency.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task name.
    pub name: String,
    /// Completed plus abandoned iterations.
    pub iterations: u64,
    /// Iterations interrupted by the global stop.
    pub abandoned_iterations: u64,
    /// Fraction of all iterations that selected this task (0.0..=1.0).
    pub observed_share: f64,
    /// Requests issued by this task.
    pub requests: u64,
    /// Failed requests issued by this task.
    pub errors: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Iteration duration P50 (milliseconds).
    pub iteration_p50: u64,
    /// Iteration duration P95 (milliseconds).
    pub iteration_p95: u64,
    /// Longest iteration (milliseconds).
    pub iteration_max: u64,
}

/// Per-endpoint snapshot with latency percentiles and error breakdown.
///
/// Sorted alphabetically by name for deterministic terminal output.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    /// Relative request name.
    pub name: String,
    /// Owning task.
    pub task: String,
    /// Success latency P50 (milliseconds).
    pub p50: u64,
    /// Success latency P95 (milliseconds).
    pub p95: u64,
    /// Success latency P99 (milliseconds).
    pub p99: u64,
    /// Minimum latency across all requests (milliseconds).
    pub min: u64,
    /// Maximum latency across all requests (milliseconds).
    pub max: u64,
    /// Mean latency across all requests (milliseconds).
    pub mean: f64,
    /// Total requests for this endpoint (success + error).
    pub total_requests: u64,
    /// Total successful requests for this endpoint.
    pub success_count: u64,
    /// Total failed requests for this endpoint.
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Error counts by classification for this endpoint.
    pub error_categories: HashMap<String, u64>,
}

/// Point-in-time snapshot of all metrics state.
///
/// All percentile values are in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Success latency P50 (milliseconds).
    pub p50: u64,
    /// Success latency P95 (milliseconds).
    pub p95: u64,
    /// Success latency P99 (milliseconds).
    pub p99: u64,
    /// Error latency P50 (milliseconds).
    pub error_p50: u64,
    /// Error latency P95 (milliseconds).
    pub error_p95: u64,
    /// Error latency P99 (milliseconds).
    pub error_p99: u64,
    /// Total successful requests recorded.
    pub success_count: u64,
    /// Total failed requests recorded.
    pub error_count: u64,
    /// Total requests (success + error).
    pub total_requests: u64,
    /// Fraction of requests that were errors (0.0..=1.0).
    pub error_rate: f64,
    /// Total iterations across all tasks.
    pub total_iterations: u64,
    /// Error counts by classification (http, timeout, connection, other).
    pub error_category_counts: HashMap<String, u64>,
    /// Per-task metrics, sorted by task name.
    pub per_task: Vec<TaskSnapshot>,
    /// Per-endpoint metrics, sorted by endpoint name.
    pub per_endpoint: Vec<EndpointSnapshot>,
}

fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> u64 {
    if histogram.is_empty() {
        0
    } else {
        histogram.value_at_quantile(q)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[derive(Default)]
struct TaskMetrics {
    iterations: u64,
    abandoned: u64,
    requests: u64,
    errors: u64,
    iteration_histogram: Option<Histogram<u64>>,
}

struct EndpointMetrics {
    task: String,
    success_histogram: Histogram<u64>,
    error_histogram: Histogram<u64>,
    total_success: u64,
    total_errors: u64,
    error_category_counts: HashMap<String, u64>,
    latency: LatencyRange,
}

/// Observed latency bounds and sum, kept apart from the histograms because
/// `record_correct` adds synthetic fill-ins to those.
#[derive(Debug, Default, Clone, Copy)]
struct LatencyRange {
    min: Option<u64>,
    max: u64,
    sum: u64,
    count: u64,
}

impl LatencyRange {
    fn record(&mut self, ms: u64) {
        self.min = Some(self.min.map_or(ms, |min| min.min(ms)));
        self.max = self.max.max(ms);
        self.sum = self.sum.saturating_add(ms);
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

impl EndpointMetrics {
    fn new(task: &str) -> Self {
        Self {
            task: task.to_owned(),
            success_histogram: new_histogram(),
            error_histogram: new_histogram(),
            total_success: 0,
            total_errors: 0,
            error_category_counts: HashMap::new(),
            latency: LatencyRange::default(),
        }
    }

    fn snapshot(&self, name: &str) -> EndpointSnapshot {
        let success_count = self.total_success;
        let error_count = self.total_errors;
        let total = success_count + error_count;
        let ok = &self.success_histogram;

        EndpointSnapshot {
            name: name.to_owned(),
            task: self.task.clone(),
            p50: quantile(ok, 0.50),
            p95: quantile(ok, 0.95),
            p99: quantile(ok, 0.99),
            min: self.latency.min.unwrap_or(0),
            max: self.latency.max,
            mean: self.latency.mean(),
            total_requests: total,
            success_count,
            error_count,
            error_rate: ratio(error_count, total),
            error_categories: self.error_category_counts.clone(),
        }
    }
}

/// HdrHistogram-backed metrics recorder with coordinated omission correction.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use buch_lasttest::loadtest::metrics::{MetricsRecorder, RequestSample};
///
/// let mut recorder = MetricsRecorder::new(10_000);
/// let sample = RequestSample::success("get_id", "/rest/1", Duration::from_millis(42));
/// recorder.record(&sample);
///
/// assert_eq!(recorder.success_count(), 1);
/// assert_eq!(recorder.p50(), 42);
/// ```
pub struct MetricsRecorder {
    success_histogram: Histogram<u64>,
    error_histogram: Histogram<u64>,
    /// Expected interval between requests in milliseconds, for `record_correct()`.
    expected_interval_ms: u64,
    total_success: u64,
    total_errors: u64,
    total_iterations: u64,
    error_category_counts: HashMap<String, u64>,
    per_task: HashMap<String, TaskMetrics>,
    per_endpoint: HashMap<String, EndpointMetrics>,
}

impl MetricsRecorder {
    /// Create a new recorder with the given expected request interval.
    ///
    /// When a request takes longer than `expected_interval_ms`, synthetic
    /// samples are filled in for requests that would have been sent during
    /// the stall. Histograms use 3 significant figures and auto-resize.
    pub fn new(expected_interval_ms: u64) -> Self {
        Self {
            success_histogram: new_histogram(),
            error_histogram: new_histogram(),
            expected_interval_ms,
            total_success: 0,
            total_errors: 0,
            total_iterations: 0,
            error_category_counts: HashMap::new(),
            per_task: HashMap::new(),
            per_endpoint: HashMap::new(),
        }
    }

    /// Ingest any event coming from a virtual user.
    pub fn ingest(&mut self, event: &MetricEvent) {
        match event {
            MetricEvent::Request(sample) => self.record(sample),
            MetricEvent::Iteration(sample) => self.record_iteration(sample),
        }
    }

    /// Record a request sample with coordinated omission correction.
    pub fn record(&mut self, sample: &RequestSample) {
        let ms = sample.duration.as_millis() as u64;
        let interval = self.expected_interval_ms;

        let task = self.per_task.entry(sample.task.clone()).or_default();
        task.requests += 1;

        let endpoint = self
            .per_endpoint
            .entry(sample.endpoint.clone())
            .or_insert_with(|| EndpointMetrics::new(&sample.task));
        endpoint.latency.record(ms);

        match &sample.result {
            Ok(()) => {
                let _ = self.success_histogram.record_correct(ms, interval);
                self.total_success += 1;
                let _ = endpoint.success_histogram.record_correct(ms, interval);
                endpoint.total_success += 1;
            },
            Err(err) => {
                let category = err.error_category();
                let _ = self.error_histogram.record_correct(ms, interval);
                self.total_errors += 1;
                *self
                    .error_category_counts
                    .entry(category.to_owned())
                    .or_insert(0) += 1;
                task.errors += 1;
                let _ = endpoint.error_histogram.record_correct(ms, interval);
                endpoint.total_errors += 1;
                *endpoint
                    .error_category_counts
                    .entry(category.to_owned())
                    .or_insert(0) += 1;
            },
        }
    }

    /// Record the completion (or abandonment) of one iteration.
    pub fn record_iteration(&mut self, sample: &IterationSample) {
        self.total_iterations += 1;
        let task = self.per_task.entry(sample.task.clone()).or_default();
        task.iterations += 1;
        if sample.abandoned {
            task.abandoned += 1;
        }
        let _ = task
            .iteration_histogram
            .get_or_insert_with(new_histogram)
            .record(sample.duration.as_millis() as u64);
    }

    /// Success latency P50 in milliseconds. Returns 0 if no samples recorded.
    pub fn p50(&self) -> u64 {
        quantile(&self.success_histogram, 0.50)
    }

    /// Success latency P95 in milliseconds. Returns 0 if no samples recorded.
    pub fn p95(&self) -> u64 {
        quantile(&self.success_histogram, 0.95)
    }

    /// Success latency P99 in milliseconds. Returns 0 if no samples recorded.
    pub fn p99(&self) -> u64 {
        quantile(&self.success_histogram, 0.99)
    }

    /// Error latency P99 in milliseconds. Returns 0 if no samples recorded.
    pub fn error_p99(&self) -> u64 {
        quantile(&self.error_histogram, 0.99)
    }

    /// Number of successful requests recorded.
    pub fn success_count(&self) -> u64 {
        self.total_success
    }

    /// Number of failed requests recorded.
    pub fn error_count(&self) -> u64 {
        self.total_errors
    }

    /// Total requests recorded.
    pub fn total_requests(&self) -> u64 {
        self.total_success + self.total_errors
    }

    /// Total iterations recorded.
    pub fn total_iterations(&self) -> u64 {
        self.total_iterations
    }

    /// Error rate as a fraction (0.0..=1.0). Returns 0.0 if no requests recorded.
    pub fn error_rate(&self) -> f64 {
        ratio(self.total_errors, self.total_requests())
    }

    /// Number of iterations that selected `task`.
    pub fn iteration_count(&self, task: &str) -> u64 {
        self.per_task.get(task).map_or(0, |t| t.iterations)
    }

    /// Number of requests recorded for `endpoint`.
    pub fn endpoint_count(&self, endpoint: &str) -> u64 {
        self.per_endpoint
            .get(endpoint)
            .map_or(0, |e| e.total_success + e.total_errors)
    }

    /// Capture a point-in-time snapshot of all metrics.
    ///
    /// Per-task and per-endpoint lists are sorted by name for deterministic
    /// terminal and JSON output.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut per_task: Vec<TaskSnapshot> = self
            .per_task
            .iter()
            .map(|(name, task)| {
                let (iteration_p50, iteration_p95, iteration_max) =
                    match &task.iteration_histogram {
                        Some(h) if !h.is_empty() => {
                            (quantile(h, 0.50), quantile(h, 0.95), h.max())
                        },
                        _ => (0, 0, 0),
                    };
                TaskSnapshot {
                    name: name.clone(),
                    iterations: task.iterations,
                    abandoned_iterations: task.abandoned,
                    observed_share: ratio(task.iterations, self.total_iterations),
                    requests: task.requests,
                    errors: task.errors,
                    error_rate: ratio(task.errors, task.requests),
                    iteration_p50,
                    iteration_p95,
                    iteration_max,
                }
            })
            .collect();
        per_task.sort_by(|a, b| a.name.cmp(&b.name));

        let mut per_endpoint: Vec<EndpointSnapshot> = self
            .per_endpoint
            .iter()
            .map(|(name, endpoint)| endpoint.snapshot(name))
            .collect();
        per_endpoint.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
            error_p50: quantile(&self.error_histogram, 0.50),
            error_p95: quantile(&self.error_histogram, 0.95),
            error_p99: self.error_p99(),
            success_count: self.total_success,
            error_count: self.total_errors,
            total_requests: self.total_requests(),
            error_rate: self.error_rate(),
            total_iterations: self.total_iterations,
            error_category_counts: self.error_category_counts.clone(),
            per_task,
            per_endpoint,
        }
    }
}
