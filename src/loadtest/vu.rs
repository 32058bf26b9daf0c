//! Virtual user (VU) task loop for load test execution.
//!
//! Each VU owns its own [`BookClient`] and RNG, picks a task by weighted
//! random choice, issues one GET per literal value of that task in list
//! order, then paces itself to the per-user throughput cap. Metrics are
//! emitted as [`MetricEvent`] values through a bounded mpsc channel.

use crate::loadtest::client::BookClient;
use crate::loadtest::config::{Endpoint, LoadTestConfig};
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{IterationSample, MetricEvent, RequestSample};
use crate::loadtest::pacing::ConstantThroughput;

use rand::distr::{weighted::WeightedIndex, Distribution as _};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Atomic counter tracking the number of currently active virtual users.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across VU tasks and the engine orchestrator.
#[derive(Clone, Debug)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    /// Increments the active VU count by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A task with all of its request URLs rendered against the target host.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    /// Task name, used as the statistics label.
    pub name: String,
    /// Scheduling weight.
    pub weight: u32,
    /// Rendered requests in value-list order.
    pub endpoints: Vec<Endpoint>,
}

/// Render every task of `config` against `base_url`.
pub fn plan_tasks(config: &LoadTestConfig, base_url: &str) -> Result<Vec<PlannedTask>, LoadTestError> {
    config
        .task
        .iter()
        .map(|task| {
            Ok(PlannedTask {
                name: task.name.clone(),
                weight: task.weight,
                endpoints: task.endpoints(base_url)?,
            })
        })
        .collect()
}

/// Weighted random choice among tasks.
///
/// The probability of picking task `i` is `weight_i / Σ weights`.
#[derive(Debug, Clone)]
pub struct TaskSelector {
    dist: WeightedIndex<u32>,
}

impl TaskSelector {
    /// Build a selector from task weights, in task order.
    pub fn new(weights: &[u32]) -> Result<Self, LoadTestError> {
        let dist = WeightedIndex::new(weights).map_err(|e| LoadTestError::ConfigValidation {
            message: format!("failed to build weighted distribution: {e}"),
        })?;
        Ok(Self { dist })
    }

    /// Build a selector for the tasks of a plan.
    pub fn for_tasks(tasks: &[PlannedTask]) -> Result<Self, LoadTestError> {
        let weights: Vec<u32> = tasks.iter().map(|t| t.weight).collect();
        Self::new(&weights)
    }

    /// Pick the index of the next task.
    pub fn select(&self, rng: &mut StdRng) -> usize {
        self.dist.sample(rng)
    }
}

/// What happened during one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationOutcome {
    /// Sub-requests issued and recorded.
    pub requests: u32,
    /// Sub-requests that failed.
    pub errors: u32,
    /// The global stop interrupted the iteration.
    pub abandoned: bool,
    /// The metrics receiver is gone; the VU should stop.
    pub channel_closed: bool,
}

/// Execute one iteration of `task`: one GET per endpoint, in order.
///
/// A failed request is recorded and the next request still runs. When
/// `cancel` fires, the request in flight and the remaining requests are
/// abandoned without being recorded.
pub async fn run_iteration(
    client: &BookClient,
    task: &PlannedTask,
    sample_tx: &mpsc::Sender<MetricEvent>,
    cancel: &CancellationToken,
) -> IterationOutcome {
    let mut outcome = IterationOutcome::default();
    let iteration_start = Instant::now();

    for endpoint in &task.endpoints {
        if cancel.is_cancelled() {
            outcome.abandoned = true;
            break;
        }

        let start = Instant::now();
        let result = tokio::select! {
            result = client.get(&endpoint.url) => Some(result),
            _ = cancel.cancelled() => None,
        };
        let Some(result) = result else {
            outcome.abandoned = true;
            break;
        };
        let duration = start.elapsed();

        outcome.requests += 1;
        let sample = match result {
            Ok(status) => {
                trace!(endpoint = %endpoint.name, status, "request ok");
                RequestSample::success(&task.name, &endpoint.name, duration)
            },
            Err(err) => {
                outcome.errors += 1;
                debug!(endpoint = %endpoint.name, error = %err, "request failed");
                RequestSample::error(&task.name, &endpoint.name, duration, err)
            },
        };

        if sample_tx.send(sample.into()).await.is_err() {
            outcome.channel_closed = true;
            return outcome;
        }
    }

    let iteration = IterationSample::new(
        &task.name,
        iteration_start.elapsed(),
        outcome.requests,
        outcome.abandoned,
    );
    if sample_tx.send(iteration.into()).await.is_err() {
        outcome.channel_closed = true;
    }
    outcome
}

/// Immutable state shared by all virtual users of one run.
#[derive(Debug)]
pub struct VuShared {
    /// Rendered tasks.
    pub tasks: Vec<PlannedTask>,
    /// Weighted task chooser.
    pub selector: TaskSelector,
    /// Per-user rate cap.
    pub pacer: ConstantThroughput,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
    /// Global iteration limit shared by all users.
    pub max_iterations: Option<u64>,
    /// Iteration slots claimed so far, when a limit is set.
    pub iteration_counter: Option<Arc<AtomicU64>>,
    /// Claimed iterations that ran to completion, when a limit is set.
    pub completed_counter: Option<Arc<AtomicU64>>,
}

impl VuShared {
    /// Assemble shared state from a validated config and target host.
    pub fn from_config(
        config: &LoadTestConfig,
        base_url: &str,
        max_iterations: Option<u64>,
    ) -> Result<Self, LoadTestError> {
        let tasks = plan_tasks(config, base_url)?;
        let selector = TaskSelector::for_tasks(&tasks)?;
        Ok(Self {
            tasks,
            selector,
            pacer: ConstantThroughput::new(config.settings.throughput_per_user),
            timeout: config.settings.timeout_as_duration(),
            accept_invalid_certs: config.settings.accept_invalid_certs,
            max_iterations,
            iteration_counter: max_iterations.map(|_| Arc::new(AtomicU64::new(0))),
            completed_counter: max_iterations.map(|_| Arc::new(AtomicU64::new(0))),
        })
    }

    /// Claim the next iteration slot. Returns `false` once the limit is used up.
    fn claim_iteration(&self) -> bool {
        match (&self.iteration_counter, self.max_iterations) {
            (Some(counter), Some(max)) => counter.fetch_add(1, Ordering::Relaxed) < max,
            _ => true,
        }
    }

    /// Count one finished iteration. Returns `true` once every allowed
    /// iteration has finished.
    fn complete_iteration(&self) -> bool {
        match (&self.completed_counter, self.max_iterations) {
            (Some(counter), Some(max)) => counter.fetch_add(1, Ordering::Relaxed) + 1 >= max,
            _ => false,
        }
    }

    /// Whether the iteration limit has been fully served.
    fn iterations_done(&self) -> bool {
        match (&self.completed_counter, self.max_iterations) {
            (Some(counter), Some(max)) => counter.load(Ordering::Relaxed) >= max,
            _ => false,
        }
    }
}

/// Main virtual user task loop.
///
/// Each VU:
/// 1. Builds its own HTTP client (TLS verification per profile setting).
/// 2. Loops select -> execute -> pace until cancellation or the iteration
///    limit is used up. A user that finds no slot left just stops; the run
///    is cancelled once the last claimed iteration has finished, so
///    iterations still in flight on other users are not abandoned.
///
/// The `active_vus` counter is incremented on entry and decremented on all
/// exit paths.
pub async fn vu_loop(
    vu_id: u32,
    shared: Arc<VuShared>,
    sample_tx: mpsc::Sender<MetricEvent>,
    cancel: CancellationToken,
    active_vus: ActiveVuCounter,
) {
    active_vus.increment();

    let client = match BookClient::new(shared.timeout, shared.accept_invalid_certs) {
        Ok(client) => client,
        Err(err) => {
            warn!(vu_id, error = %err, "virtual user could not start");
            active_vus.decrement();
            return;
        },
    };

    let mut rng = StdRng::from_rng(&mut rand::rng());

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !shared.claim_iteration() {
            if shared.iterations_done() {
                cancel.cancel();
            }
            break;
        }

        let task = &shared.tasks[shared.selector.select(&mut rng)];
        let iteration_start = Instant::now();
        let outcome = run_iteration(&client, task, &sample_tx, &cancel).await;

        if outcome.channel_closed || outcome.abandoned {
            break;
        }

        if shared.complete_iteration() {
            debug!(vu_id, "iteration limit reached");
            cancel.cancel();
            break;
        }

        if !shared.pacer.pace(iteration_start, &cancel).await {
            break;
        }
    }

    debug!(vu_id, "virtual user stopped");
    active_vus.decrement();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::config::LoadTestConfig;

    #[test]
    fn test_active_vu_counter_increment_decrement() {
        let counter = ActiveVuCounter::new();
        assert_eq!(counter.get(), 0);

        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 3);

        counter.decrement();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_plan_tasks_renders_every_value() {
        let config = LoadTestConfig::buch_profile();
        let tasks = plan_tasks(&config, "https://localhost:3000").unwrap();
        let counts: Vec<usize> = tasks.iter().map(|t| t.endpoints.len()).collect();
        assert_eq!(counts, vec![6, 5, 6]);
        assert_eq!(
            tasks[1].endpoints[0].url.as_str(),
            "https://localhost:3000/rest?titel=a"
        );
    }

    #[test]
    fn test_selector_rejects_all_zero_weights() {
        assert!(TaskSelector::new(&[0, 0]).is_err());
        assert!(TaskSelector::new(&[]).is_err());
    }

    #[test]
    fn test_selector_never_picks_zero_weight() {
        let selector = TaskSelector::new(&[0, 5, 0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert_eq!(selector.select(&mut rng), 1);
        }
    }

    #[test]
    fn test_selector_converges_to_buch_weights() {
        let selector = TaskSelector::new(&[100, 200, 150]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 3];
        let draws = 90_000;
        for _ in 0..draws {
            counts[selector.select(&mut rng)] += 1;
        }
        let expected = [2.0 / 9.0, 4.0 / 9.0, 3.0 / 9.0];
        for (i, count) in counts.iter().enumerate() {
            let observed = f64::from(*count) / f64::from(draws);
            assert!(
                (observed - expected[i]).abs() < 0.01,
                "task {i}: observed {observed:.4}, expected {:.4}",
                expected[i]
            );
        }
    }

    #[test]
    fn test_claim_iteration_respects_limit() {
        let config = LoadTestConfig::buch_profile();
        let shared = VuShared::from_config(&config, "http://localhost:3000", Some(2)).unwrap();
        assert!(shared.claim_iteration());
        assert!(shared.claim_iteration());
        assert!(!shared.claim_iteration());

        let unlimited = VuShared::from_config(&config, "http://localhost:3000", None).unwrap();
        for _ in 0..10 {
            assert!(unlimited.claim_iteration());
        }
    }

    #[test]
    fn test_limit_is_done_only_after_claimed_iterations_complete() {
        let config = LoadTestConfig::buch_profile();
        let shared = VuShared::from_config(&config, "http://localhost:3000", Some(2)).unwrap();
        assert!(shared.claim_iteration());
        assert!(shared.claim_iteration());
        assert!(!shared.claim_iteration(), "no slot left");
        assert!(!shared.iterations_done(), "claimed iterations still running");

        assert!(!shared.complete_iteration());
        assert!(!shared.iterations_done());
        assert!(shared.complete_iteration());
        assert!(shared.iterations_done());

        let unlimited = VuShared::from_config(&config, "http://localhost:3000", None).unwrap();
        assert!(!unlimited.complete_iteration());
        assert!(!unlimited.iterations_done());
    }

    #[test]
    fn test_zero_iteration_limit_is_done_immediately() {
        let config = LoadTestConfig::buch_profile();
        let shared = VuShared::from_config(&config, "http://localhost:3000", Some(0)).unwrap();
        assert!(!shared.claim_iteration());
        assert!(shared.iterations_done());
    }

    #[tokio::test]
    async fn test_run_iteration_cancelled_before_start_is_abandoned() {
        let config = LoadTestConfig::buch_profile();
        let tasks = plan_tasks(&config, "http://127.0.0.1:1").unwrap();
        let client = BookClient::new(Duration::from_millis(200), true).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_iteration(&client, &tasks[0], &tx, &cancel).await;
        assert!(outcome.abandoned);
        assert_eq!(outcome.requests, 0);

        match rx.recv().await {
            Some(MetricEvent::Iteration(it)) => {
                assert!(it.abandoned);
                assert_eq!(it.task, "get_id");
            },
            other => panic!("expected iteration event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_iteration_reports_closed_channel() {
        let config = LoadTestConfig::buch_profile();
        let tasks = plan_tasks(&config, "http://127.0.0.1:1").unwrap();
        let client = BookClient::new(Duration::from_millis(200), true).unwrap();
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let outcome = run_iteration(&client, &tasks[0], &tx, &CancellationToken::new()).await;
        assert!(outcome.channel_closed);
        assert_eq!(outcome.requests, 1, "stops after the first undeliverable sample");
    }
}
