//! Property-based tests for metrics pipeline invariants.

use proptest::prelude::*;
use std::time::Duration;

use buch_lasttest::loadtest::error::RequestError;
use buch_lasttest::loadtest::metrics::{
    IterationSample, MetricEvent, MetricsRecorder, RequestSample,
};

fn arb_error() -> impl Strategy<Value = RequestError> {
    prop_oneof![
        (400u16..600).prop_map(|status| RequestError::Http { status }),
        Just(RequestError::Timeout),
        "[a-z ]{1,20}".prop_map(|message| RequestError::Connection { message }),
        "[a-z ]{1,20}".prop_map(|message| RequestError::Other { message }),
    ]
}

proptest! {
    /// Request counts are logical: synthetic coordinated-omission fills
    /// never inflate them, whatever the latency.
    #[test]
    fn metrics_total_matches_sample_count(
        success_count in 0u32..100,
        error_count in 0u32..50,
        latency_ms in 1u64..500,
        interval_ms in 1u64..100,
    ) {
        let mut recorder = MetricsRecorder::new(interval_ms);
        for _ in 0..success_count {
            recorder.record(&RequestSample::success(
                "get_id",
                "/rest/1",
                Duration::from_millis(latency_ms),
            ));
        }
        for _ in 0..error_count {
            recorder.record(&RequestSample::error(
                "get_id",
                "/rest/1",
                Duration::from_millis(latency_ms),
                RequestError::Timeout,
            ));
        }
        let snap = recorder.snapshot();
        prop_assert_eq!(snap.success_count, u64::from(success_count));
        prop_assert_eq!(snap.error_count, u64::from(error_count));
        prop_assert_eq!(snap.total_requests, u64::from(success_count + error_count));
        prop_assert_eq!(recorder.endpoint_count("/rest/1"), u64::from(success_count + error_count));
    }

    /// Error rate is always between 0.0 and 1.0 inclusive.
    #[test]
    fn error_rate_bounded(
        success_count in 0u32..100,
        errors in prop::collection::vec(arb_error(), 0..100),
    ) {
        let mut recorder = MetricsRecorder::new(10_000);
        for _ in 0..success_count {
            recorder.record(&RequestSample::success("get_titel", "/rest?titel=a", Duration::from_millis(50)));
        }
        for err in &errors {
            recorder.record(&RequestSample::error(
                "get_titel",
                "/rest?titel=a",
                Duration::from_millis(50),
                err.clone(),
            ));
        }
        let rate = recorder.error_rate();
        prop_assert!((0.0..=1.0).contains(&rate), "error_rate {} out of bounds", rate);
    }

    /// Error categories partition the error count.
    #[test]
    fn error_categories_sum_to_error_count(errors in prop::collection::vec(arb_error(), 0..200)) {
        let mut recorder = MetricsRecorder::new(10_000);
        for err in &errors {
            recorder.record(&RequestSample::error("get_isbn", "/rest?isbn=x", Duration::from_millis(5), err.clone()));
        }
        let snap = recorder.snapshot();
        let sum: u64 = snap.error_category_counts.values().sum();
        prop_assert_eq!(sum, snap.error_count);
        for key in snap.error_category_counts.keys() {
            prop_assert!(["http", "timeout", "connection", "other"].contains(&key.as_str()));
        }
    }

    /// Percentiles are monotonic: p50 <= p95 <= p99.
    #[test]
    fn percentiles_monotonic(latencies in prop::collection::vec(1u64..10_000, 1..200)) {
        let mut recorder = MetricsRecorder::new(100_000);
        for ms in &latencies {
            recorder.record(&RequestSample::success("get_id", "/rest/1", Duration::from_millis(*ms)));
        }
        prop_assert!(recorder.p50() <= recorder.p95());
        prop_assert!(recorder.p95() <= recorder.p99());
    }

    /// Observed task shares sum to one and iteration counts add up.
    #[test]
    fn task_shares_sum_to_one(picks in prop::collection::vec(0usize..3, 1..300)) {
        let names = ["get_id", "get_titel", "get_isbn"];
        let mut recorder = MetricsRecorder::new(10_000);
        for pick in &picks {
            let event = MetricEvent::from(IterationSample::new(
                names[*pick],
                Duration::from_millis(10),
                5,
                false,
            ));
            recorder.ingest(&event);
        }
        let snap = recorder.snapshot();
        prop_assert_eq!(snap.total_iterations, picks.len() as u64);
        let share_sum: f64 = snap.per_task.iter().map(|t| t.observed_share).sum();
        prop_assert!((share_sum - 1.0).abs() < 1e-9);
        let count_sum: u64 = names.iter().map(|n| recorder.iteration_count(n)).sum();
        prop_assert_eq!(count_sum, picks.len() as u64);
    }
}
