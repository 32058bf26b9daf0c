//! Load test execution engine with metrics aggregation and graceful shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Spawns the fixed VU population via [`tokio_util::task::TaskTracker`],
//!   all at once or at the configured spawn rate
//! - Collects metrics through a bounded mpsc channel
//! - Publishes snapshots through a watch channel for live display
//! - Coordinates graceful shutdown via [`CancellationToken`]
//!
//! The run stops on the first of: duration elapsed, iteration limit reached,
//! or Ctrl+C. Every VU then finishes or abandons its current iteration.

use crate::loadtest::config::{validate_base_url, LoadTestConfig};
use crate::loadtest::display::display_loop;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{MetricEvent, MetricsRecorder, MetricsSnapshot};
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, VuShared};

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Compile-time Send bounds verification for channel-transported types.
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<MetricEvent>();
    _assert_send::<MetricsSnapshot>();
}

/// Interval between live snapshots.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    base_url: String,
    max_iterations: Option<u64>,
    no_color: bool,
    display: bool,
}

impl LoadTestEngine {
    /// Creates a new engine with the given profile and target host.
    pub fn new(config: LoadTestConfig, base_url: String) -> Self {
        Self {
            config,
            base_url,
            max_iterations: None,
            no_color: false,
            display: true,
        }
    }

    /// Sets an iteration limit. The test stops after this many total iterations
    /// across all VUs (first-limit-wins with duration).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Enables or disables the live terminal display.
    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    /// Returns a reference to the engine's profile.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Returns the target host.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the configured max iterations, if any.
    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Returns whether colored output is disabled.
    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Run the load test. Returns the final metrics snapshot.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;
        validate_base_url(&self.base_url)?;

        let settings = &self.config.settings;
        let users = settings.users;
        let shared = Arc::new(VuShared::from_config(
            &self.config,
            &self.base_url,
            self.max_iterations,
        )?);

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();

        let buffer_size = (users as usize).saturating_mul(100);
        let (sample_tx, sample_rx) = mpsc::channel::<MetricEvent>(buffer_size);
        let expected_interval_ms = settings.expected_interval_ms;
        let (display_tx, display_rx) =
            watch::channel(MetricsRecorder::new(expected_interval_ms).snapshot());

        let test_start = Instant::now();
        let spawn_interval = settings.spawn_interval();

        // Samples taken before the whole population is running are left out
        // of the final report when users are spawned gradually.
        let ramp_up_end = Arc::new(OnceLock::new());
        if spawn_interval.is_zero() {
            let _ = ramp_up_end.set(test_start);
        }

        info!(
            users,
            throughput_per_user = settings.throughput_per_user,
            duration_secs = settings.duration_secs,
            target = %self.base_url,
            "starting load test"
        );

        // Spawn metrics aggregator (NOT on tracker -- must outlive VU tasks)
        let aggregator_handle = tokio::spawn(metrics_aggregator(
            sample_rx,
            display_tx,
            cancel.clone(),
            expected_interval_ms,
            ramp_up_end.clone(),
        ));

        let display_handle = self.display.then(|| {
            tokio::spawn(display_loop(
                display_rx.clone(),
                active_vus.clone(),
                users,
                ramp_up_end.clone(),
                cancel.clone(),
                self.no_color,
                test_start,
            ))
        });

        let spawner = async {
            let mut spawned = 0;
            for vu_id in 0..users {
                if cancel.is_cancelled() {
                    break;
                }
                tracker.spawn(vu_loop(
                    vu_id,
                    shared.clone(),
                    sample_tx.clone(),
                    cancel.clone(),
                    active_vus.clone(),
                ));
                spawned += 1;
                // Stagger between spawns (not after last)
                if !spawn_interval.is_zero() && vu_id + 1 < users {
                    tokio::select! {
                        _ = tokio::time::sleep(spawn_interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
            if spawned == users && ramp_up_end.set(Instant::now()).is_ok() {
                info!(users, "all virtual users spawned");
            }
            std::future::pending::<()>().await
        };

        // Run controller -- first-limit-wins between duration, iteration limit, Ctrl+C
        let duration = Duration::from_secs(settings.duration_secs);
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!("test duration reached");
            }
            _ = cancel.cancelled() => {
                info!("stop requested");
            }
            _ = handle_ctrl_c(cancel.clone()) => {}
            _ = spawner => {}
        }
        cancel.cancel();

        // Drop original sender -- VUs hold their own clones
        drop(sample_tx);

        // Drain: close tracker and wait for all VU tasks
        tracker.close();
        tracker.wait().await;

        // Wait for aggregator to finish processing remaining samples
        if let Err(e) = aggregator_handle.await {
            warn!(error = %e, "metrics aggregator task failed");
        }

        if let Some(handle) = display_handle {
            let _ = handle.await;
        }

        let final_snapshot = display_rx.borrow().clone();

        Ok(LoadTestResult {
            snapshot: final_snapshot,
            elapsed: test_start.elapsed(),
            target_users: users,
            final_active_vus: active_vus.get(),
            ramp_up: ramp_up_end.get().map(|end| end.duration_since(test_start)),
        })
    }
}

/// Result of a completed load test run.
#[derive(Debug)]
pub struct LoadTestResult {
    /// Final metrics snapshot. Excludes ramp-up when spawning finished;
    /// covers the whole run otherwise.
    pub snapshot: MetricsSnapshot,
    /// Total elapsed time of the test.
    pub elapsed: Duration,
    /// Configured user population.
    pub target_users: u32,
    /// Number of VUs that were still active at test end.
    pub final_active_vus: u32,
    /// Time until the whole population was running, `None` if the run ended
    /// before spawning finished.
    pub ramp_up: Option<Duration>,
}

impl LoadTestResult {
    /// Wall-clock span the final snapshot covers, in seconds.
    pub fn measured_secs(&self) -> f64 {
        let ramp_up = self.ramp_up.unwrap_or(Duration::ZERO);
        self.elapsed.saturating_sub(ramp_up).as_secs_f64()
    }

    /// Observed requests per second over the measured span.
    pub fn request_rate(&self) -> f64 {
        per_second(self.snapshot.total_requests, self.measured_secs())
    }

    /// Observed iterations per second over the measured span.
    pub fn iteration_rate(&self) -> f64 {
        per_second(self.snapshot.total_iterations, self.measured_secs())
    }
}

fn per_second(count: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Metrics aggregator task.
///
/// Consumes [`MetricEvent`] values from the mpsc channel, records them
/// into dual recorders (live + report), and publishes a snapshot via the
/// watch channel every 2 seconds.
///
/// Uses `biased;` select to ensure the tick branch is checked first,
/// preventing display starvation when the mpsc channel is busy.
///
/// The dual-recorder pattern excludes ramp-up samples from the final report:
/// - `live` records ALL samples (for live display)
/// - `report` records only samples taken after `ramp_up_end` is set
///
/// If the run ends before `ramp_up_end` is set, the live snapshot is
/// published as the final one.
async fn metrics_aggregator(
    mut sample_rx: mpsc::Receiver<MetricEvent>,
    display_tx: watch::Sender<MetricsSnapshot>,
    cancel: CancellationToken,
    expected_interval_ms: u64,
    ramp_up_end: Arc<OnceLock<Instant>>,
) {
    let mut recorders = DualRecorder {
        live: MetricsRecorder::new(expected_interval_ms),
        report: MetricsRecorder::new(expected_interval_ms),
        ramp_up_end,
    };
    let mut tick = tokio::time::interval(SNAPSHOT_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                // Drain all available samples before publishing snapshot
                while let Ok(event) = sample_rx.try_recv() {
                    recorders.ingest(&event);
                }
                let _ = display_tx.send(recorders.live.snapshot());
            }
            result = sample_rx.recv() => {
                match result {
                    Some(event) => recorders.ingest(&event),
                    None => break,
                }
            }
            _ = cancel.cancelled() => {
                // Drain until every VU has dropped its sender
                while let Some(event) = sample_rx.recv().await {
                    recorders.ingest(&event);
                }
                break;
            }
        }
    }

    let _ = display_tx.send(recorders.final_snapshot());
}

/// Live recorder for the display plus a report recorder that only sees
/// samples taken once the whole population is running.
struct DualRecorder {
    live: MetricsRecorder,
    report: MetricsRecorder,
    ramp_up_end: Arc<OnceLock<Instant>>,
}

impl DualRecorder {
    fn ingest(&mut self, event: &MetricEvent) {
        if matches!(self.ramp_up_end.get(), Some(end) if event.timestamp() >= *end) {
            self.report.ingest(event);
        }
        self.live.ingest(event);
    }

    fn final_snapshot(&self) -> MetricsSnapshot {
        match self.ramp_up_end.get() {
            Some(_) => self.report.snapshot(),
            None => self.live.snapshot(),
        }
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install Ctrl+C handler");
        return std::future::pending().await;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
