//! Property-based tests for profile parsing, request rendering, task
//! selection and pacing.
//!
//! Uses proptest to verify invariants across randomized inputs:
//! - Settings survive a TOML parse for valid inputs
//! - Validation rejects profiles whose weights sum to zero
//! - Expected rates follow from users, throughput, weights and list lengths
//! - Query values are percent-encoded and decode back to the literal
//! - Weighted selection tracks the weight ratios
//! - Pacing never waits longer than one period

use buch_lasttest::loadtest::config::{LoadTestConfig, ParamValue, TaskTemplate};
use buch_lasttest::loadtest::error::LoadTestError;
use buch_lasttest::loadtest::pacing::ConstantThroughput;
use buch_lasttest::loadtest::vu::TaskSelector;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn task(name: &str, weight: u32, len: usize) -> TaskTemplate {
    TaskTemplate {
        name: name.to_string(),
        weight,
        path: "/rest/{value}".to_string(),
        query: None,
        values: (1..=len as i64).map(ParamValue::from).collect(),
    }
}

proptest! {
    /// Settings parsed from TOML keep their values.
    #[test]
    fn prop_valid_settings_parse(
        users in 1u32..=5000,
        duration_secs in 1u64..=3600,
        timeout_ms in 100u64..=30000,
        throughput_tenths in 1u32..=100,
        weight in 1u32..=1000,
    ) {
        let throughput = f64::from(throughput_tenths) / 10.0;
        let toml_str = format!(
            r#"[settings]
users = {users}
throughput_per_user = {throughput:?}
duration_secs = {duration_secs}
timeout_ms = {timeout_ms}

[[task]]
name = "get_id"
weight = {weight}
path = "/rest/{{value}}"
values = [1, 20]
"#
        );

        let config = LoadTestConfig::from_toml(&toml_str).unwrap();
        prop_assert_eq!(config.settings.users, users);
        prop_assert_eq!(config.settings.duration_secs, duration_secs);
        prop_assert_eq!(config.settings.timeout_ms, timeout_ms);
        prop_assert!((config.settings.throughput_per_user - throughput).abs() < 1e-12);
        prop_assert_eq!(config.task[0].weight, weight);
        prop_assert!(config.settings.accept_invalid_certs);
    }

    /// Profiles whose task weights are all zero are rejected.
    #[test]
    fn prop_zero_total_weight_rejected(count in 1usize..5) {
        let mut config = LoadTestConfig::buch_profile();
        config.task = (0..count).map(|i| task(&format!("t{i}"), 0, 3)).collect();
        let err = config.validate().unwrap_err();
        prop_assert!(matches!(err, LoadTestError::ConfigValidation { .. }), "expected ConfigValidation, got {:?}", err);
    }

    /// Expected request rate is users * throughput * weighted mean list length.
    #[test]
    fn prop_expected_rates(
        users in 1u32..=2000,
        throughput_hundredths in 1u32..=1000,
        tasks in prop::collection::vec((1u32..=500, 1usize..=10), 1..6),
    ) {
        let mut config = LoadTestConfig::buch_profile();
        config.settings.users = users;
        config.settings.throughput_per_user = f64::from(throughput_hundredths) / 100.0;
        config.task = tasks
            .iter()
            .enumerate()
            .map(|(i, (w, len))| task(&format!("t{i}"), *w, *len))
            .collect();

        let total: f64 = tasks.iter().map(|(w, _)| f64::from(*w)).sum();
        let mean: f64 = tasks.iter().map(|(w, len)| f64::from(*w) * *len as f64).sum::<f64>() / total;
        let iteration_rate = f64::from(users) * config.settings.throughput_per_user;

        prop_assert!((config.expected_iteration_rate() - iteration_rate).abs() < 1e-6);
        prop_assert!((config.mean_requests_per_iteration() - mean).abs() < 1e-9);
        prop_assert!((config.expected_request_rate() - iteration_rate * mean).abs() < 1e-6);

        let share_sum: f64 = config.task.iter().map(|t| config.expected_share(t)).sum();
        prop_assert!((share_sum - 1.0).abs() < 1e-9);
    }

    /// Query values are encoded so they decode back to the literal value.
    #[test]
    fn prop_query_value_decodes_to_literal(value in "[ -~]{1,20}") {
        let template = TaskTemplate {
            name: "get_titel".to_string(),
            weight: 1,
            path: "/rest".to_string(),
            query: Some("titel".to_string()),
            values: vec![ParamValue::from(value.as_str())],
        };
        let url = template.render("https://localhost:3000", &template.values[0]).unwrap();
        prop_assert_eq!(url.path(), "/rest");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        prop_assert_eq!(pairs, vec![("titel".to_string(), value)]);
    }

    /// Observed selection shares stay close to weight ratios.
    #[test]
    fn prop_selection_tracks_weights(
        weights in prop::collection::vec(1u32..=300, 2..5),
        seed in any::<u64>(),
    ) {
        let selector = TaskSelector::new(&weights).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let draws = 20_000u32;
        let mut counts = vec![0u32; weights.len()];
        for _ in 0..draws {
            counts[selector.select(&mut rng)] += 1;
        }

        let total: u32 = weights.iter().sum();
        for (i, count) in counts.iter().enumerate() {
            let expected = f64::from(weights[i]) / f64::from(total);
            let observed = f64::from(*count) / f64::from(draws);
            prop_assert!(
                (observed - expected).abs() < 0.03,
                "index {}: observed {:.4}, expected {:.4}", i, observed, expected
            );
        }
    }

    /// The pacing wait is never longer than one period and makes up the
    /// remainder of the period exactly when the iteration was shorter.
    #[test]
    fn prop_pacing_wait_bounded(
        rate_hundredths in 1u32..=10_000,
        busy_ms in 0u64..=120_000,
    ) {
        let pacer = ConstantThroughput::new(f64::from(rate_hundredths) / 100.0);
        let busy = Duration::from_millis(busy_ms);
        let wait = pacer.wait_time(busy);

        prop_assert!(wait <= pacer.period());
        if busy >= pacer.period() {
            prop_assert_eq!(wait, Duration::ZERO);
        } else {
            prop_assert_eq!(wait + busy, pacer.period());
        }
    }
}
