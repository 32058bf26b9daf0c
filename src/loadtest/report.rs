//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report file containing latency percentiles,
//! observed and expected throughput, error classification, per-task and
//! per-endpoint breakdowns, and the full resolved profile for reproducibility.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::loadtest::config::{LoadTestConfig, Settings, TaskTemplate};
use crate::loadtest::engine::LoadTestResult;

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Target host that was tested.
    pub target_url: String,
    /// Actual test duration in seconds.
    pub duration_secs: f64,
    /// Seconds until every user was running, absent if spawning never finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_up_secs: Option<f64>,
    /// Full resolved profile (with CLI overrides applied).
    pub config: ReportConfig,
    /// Aggregate performance metrics.
    pub metrics: ReportMetrics,
    /// Rates the profile should produce when the server keeps up.
    pub expected: ExpectedRates,
    /// Error counts by classification type.
    pub errors: HashMap<String, u64>,
    /// Per-task metrics keyed by task name.
    pub per_task: BTreeMap<String, TaskReportMetrics>,
    /// Per-endpoint metrics keyed by request name.
    pub per_endpoint: BTreeMap<String, EndpointReportMetrics>,
}

/// Resolved profile embedded in the report.
#[derive(Debug, Serialize)]
pub struct ReportConfig {
    /// Run settings.
    pub settings: Settings,
    /// Task templates in profile order.
    pub task: Vec<TaskTemplate>,
}

/// Aggregate performance metrics in the report.
#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    /// Total number of requests made.
    pub total_requests: u64,
    /// Number of successful requests.
    pub success_count: u64,
    /// Number of failed requests.
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Total iterations across all users.
    pub total_iterations: u64,
    /// Throughput in requests per second.
    pub throughput_rps: f64,
    /// Iterations per second.
    pub iteration_rate: f64,
    /// Latency percentile breakdown.
    pub latency: LatencyMetrics,
}

/// Latency percentile metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds.
    pub p50_ms: u64,
    /// 95th percentile latency in milliseconds.
    pub p95_ms: u64,
    /// 99th percentile latency in milliseconds.
    pub p99_ms: u64,
    /// Error latency 50th percentile in milliseconds.
    pub error_p50_ms: u64,
    /// Error latency 95th percentile in milliseconds.
    pub error_p95_ms: u64,
    /// Error latency 99th percentile in milliseconds.
    pub error_p99_ms: u64,
}

/// Expected steady-state rates derived from the profile.
#[derive(Debug, Serialize)]
pub struct ExpectedRates {
    /// `users * throughput_per_user`.
    pub iteration_rate: f64,
    /// Weighted mean of requests per iteration.
    pub requests_per_iteration: f64,
    /// `iteration_rate * requests_per_iteration`.
    pub request_rate: f64,
    /// Expected share of iterations per task.
    pub task_share: BTreeMap<String, f64>,
}

/// Per-task metrics for JSON report output.
#[derive(Debug, Serialize)]
pub struct TaskReportMetrics {
    pub iterations: u64,
    pub abandoned_iterations: u64,
    pub observed_share: f64,
    pub expected_share: f64,
    pub requests: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub iteration_p50_ms: u64,
    pub iteration_p95_ms: u64,
    pub iteration_max_ms: u64,
}

/// Per-endpoint metrics for JSON report output.
#[derive(Debug, Serialize)]
pub struct EndpointReportMetrics {
    /// Task that issues this request.
    pub task: String,
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub latency: EndpointLatencyMetrics,
    /// Error counts by classification for this endpoint.
    pub errors: HashMap<String, u64>,
}

/// Per-endpoint latency metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct EndpointLatencyMetrics {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
}

impl LoadTestReport {
    /// Build a report from load test results, profile, and target host.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig, url: &str) -> Self {
        let snap = &result.snapshot;

        let per_task = snap
            .per_task
            .iter()
            .map(|task| {
                let expected_share = config
                    .find_task(&task.name)
                    .map(|t| config.expected_share(t))
                    .unwrap_or(0.0);
                (
                    task.name.clone(),
                    TaskReportMetrics {
                        iterations: task.iterations,
                        abandoned_iterations: task.abandoned_iterations,
                        observed_share: task.observed_share,
                        expected_share,
                        requests: task.requests,
                        errors: task.errors,
                        error_rate: task.error_rate,
                        iteration_p50_ms: task.iteration_p50,
                        iteration_p95_ms: task.iteration_p95,
                        iteration_max_ms: task.iteration_max,
                    },
                )
            })
            .collect();

        let per_endpoint = snap
            .per_endpoint
            .iter()
            .map(|endpoint| {
                (
                    endpoint.name.clone(),
                    EndpointReportMetrics {
                        task: endpoint.task.clone(),
                        total_requests: endpoint.total_requests,
                        success_count: endpoint.success_count,
                        error_count: endpoint.error_count,
                        error_rate: endpoint.error_rate,
                        latency: EndpointLatencyMetrics {
                            p50_ms: endpoint.p50,
                            p95_ms: endpoint.p95,
                            p99_ms: endpoint.p99,
                            min_ms: endpoint.min,
                            max_ms: endpoint.max,
                            mean_ms: endpoint.mean,
                        },
                        errors: endpoint.error_categories.clone(),
                    },
                )
            })
            .collect();

        let task_share = config
            .task
            .iter()
            .map(|t| (t.name.clone(), config.expected_share(t)))
            .collect();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: url.to_string(),
            duration_secs: result.elapsed.as_secs_f64(),
            ramp_up_secs: result.ramp_up.map(|d| d.as_secs_f64()),
            config: ReportConfig {
                settings: config.settings.clone(),
                task: config.task.clone(),
            },
            metrics: ReportMetrics {
                total_requests: snap.total_requests,
                success_count: snap.success_count,
                error_count: snap.error_count,
                error_rate: snap.error_rate,
                total_iterations: snap.total_iterations,
                throughput_rps: result.request_rate(),
                iteration_rate: result.iteration_rate(),
                latency: LatencyMetrics {
                    p50_ms: snap.p50,
                    p95_ms: snap.p95,
                    p99_ms: snap.p99,
                    error_p50_ms: snap.error_p50,
                    error_p95_ms: snap.error_p95,
                    error_p99_ms: snap.error_p99,
                },
            },
            expected: ExpectedRates {
                iteration_rate: config.expected_iteration_rate(),
                requests_per_iteration: config.mean_requests_per_iteration(),
                request_rate: config.expected_request_rate(),
                task_share,
            },
            errors: snap.error_category_counts.clone(),
            per_task,
            per_endpoint,
        }
    }
}

/// Write a JSON report file to the `.lasttest/reports/` directory.
///
/// Creates the reports directory if it does not exist. The filename is
/// timestamped with hyphens instead of colons so it is valid on Windows.
///
/// Returns the path to the written report file.
pub fn write_report(report: &LoadTestReport, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(".lasttest").join("reports");
    std::fs::create_dir_all(&reports_dir)?;

    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// Report filename for a given timestamp.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("lasttest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{EndpointSnapshot, MetricsSnapshot, TaskSnapshot};
    use chrono::TimeZone;
    use std::time::Duration;

    const URL: &str = "https://localhost:3000";

    fn test_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            p50: 42,
            p95: 120,
            p99: 350,
            error_p50: 100,
            error_p95: 200,
            error_p99: 500,
            success_count: 950,
            error_count: 50,
            total_requests: 1000,
            error_rate: 0.05,
            total_iterations: 180,
            error_category_counts: HashMap::from([
                ("timeout".to_string(), 30),
                ("http".to_string(), 20),
            ]),
            per_task: vec![TaskSnapshot {
                name: "get_titel".to_string(),
                iterations: 80,
                abandoned_iterations: 1,
                observed_share: 0.45,
                requests: 399,
                errors: 4,
                error_rate: 4.0 / 399.0,
                iteration_p50: 250,
                iteration_p95: 410,
                iteration_max: 700,
            }],
            per_endpoint: vec![EndpointSnapshot {
                name: "/rest?titel=a".to_string(),
                task: "get_titel".to_string(),
                p50: 40,
                p95: 95,
                p99: 180,
                min: 8,
                max: 220,
                mean: 47.5,
                total_requests: 80,
                success_count: 78,
                error_count: 2,
                error_rate: 0.025,
                error_categories: HashMap::from([("http".to_string(), 2)]),
            }],
        }
    }

    fn test_result() -> LoadTestResult {
        LoadTestResult {
            snapshot: test_snapshot(),
            elapsed: Duration::from_secs(60),
            target_users: 500,
            final_active_vus: 0,
            ramp_up: Some(Duration::ZERO),
        }
    }

    fn test_report() -> LoadTestReport {
        LoadTestReport::from_result(&test_result(), &LoadTestConfig::buch_profile(), URL)
    }

    #[test]
    fn test_report_header_fields() {
        let report = test_report();
        assert_eq!(report.schema_version, "1.0");
        assert_eq!(report.target_url, URL);
        assert!((report.duration_secs - 60.0).abs() < 0.001);
        assert!(chrono::DateTime::parse_from_rfc3339(&report.timestamp).is_ok());
    }

    #[test]
    fn test_report_embeds_config() {
        let report = test_report();
        assert_eq!(report.config.settings.users, 500);
        assert_eq!(report.config.task.len(), 3);
        assert_eq!(report.config.task[0].name, "get_id");
    }

    #[test]
    fn test_report_metrics() {
        let report = test_report();
        assert_eq!(report.metrics.total_requests, 1000);
        assert_eq!(report.metrics.success_count, 950);
        assert_eq!(report.metrics.error_count, 50);
        assert_eq!(report.metrics.total_iterations, 180);
        assert!((report.metrics.throughput_rps - 16.666).abs() < 0.1);
        assert!((report.metrics.iteration_rate - 3.0).abs() < 0.001);
        assert_eq!(report.metrics.latency.p95_ms, 120);
        assert_eq!(report.metrics.latency.error_p99_ms, 500);
    }

    #[test]
    fn test_report_expected_rates() {
        let report = test_report();
        assert!((report.expected.iteration_rate - 50.0).abs() < 1e-9);
        assert!((report.expected.requests_per_iteration - 50.0 / 9.0).abs() < 1e-9);
        assert!((report.expected.request_rate - 2500.0 / 9.0).abs() < 1e-9);
        let share = report.expected.task_share["get_titel"];
        assert!((share - 4.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_per_task_and_endpoint() {
        let report = test_report();
        let titel = &report.per_task["get_titel"];
        assert_eq!(titel.iterations, 80);
        assert_eq!(titel.abandoned_iterations, 1);
        assert!((titel.expected_share - 4.0 / 9.0).abs() < 1e-9);

        let endpoint = &report.per_endpoint["/rest?titel=a"];
        assert_eq!(endpoint.task, "get_titel");
        assert_eq!(endpoint.latency.min_ms, 8);
        assert_eq!(endpoint.errors.get("http"), Some(&2));
    }

    #[test]
    fn test_report_serializes_to_valid_json() {
        let json = serde_json::to_string_pretty(&test_report()).expect("should serialize");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should parse back");

        assert_eq!(parsed["schema_version"], "1.0");
        assert_eq!(parsed["config"]["settings"]["users"], 500);
        assert_eq!(parsed["config"]["task"][0]["values"][0], 1);
        assert_eq!(parsed["config"]["task"][1]["values"][0], "a");
        assert!(parsed["per_endpoint"]["/rest?titel=a"]["latency"]["p50_ms"].is_u64());
        assert_eq!(parsed["errors"]["timeout"], 30);
    }

    #[test]
    fn test_report_omits_ramp_up_when_spawning_incomplete() {
        let mut result = test_result();
        result.ramp_up = None;
        let report = LoadTestReport::from_result(&result, &LoadTestConfig::buch_profile(), URL);
        let parsed = serde_json::to_value(&report).unwrap();
        assert!(parsed.get("ramp_up_secs").is_none());
    }

    #[test]
    fn test_report_filename_format() {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 14, 5, 9).unwrap();
        assert_eq!(report_filename(&ts), "lasttest-2026-03-01T14-05-09.json");
    }

    #[test]
    fn test_write_report_creates_file_and_directory() {
        let tmp_dir = tempfile::tempdir().expect("should create temp dir");
        let reports_dir = tmp_dir.path().join(".lasttest").join("reports");
        assert!(!reports_dir.exists());

        let path = write_report(&test_report(), tmp_dir.path()).expect("write_report");
        assert!(reports_dir.exists(), "Reports directory should be auto-created");
        assert!(path.starts_with(&reports_dir));

        let content = std::fs::read_to_string(&path).expect("should read file");
        let parsed: serde_json::Value =
            serde_json::from_str(&content).expect("should be valid JSON");
        assert_eq!(parsed["target_url"], URL);
    }
}
