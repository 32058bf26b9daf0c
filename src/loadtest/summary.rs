//! Terminal summary renderer for load test results.
//!
//! Produces a colorized, human-readable summary with:
//! - ASCII art header with the run configuration
//! - Dotted-line metric rows (metric.........: value)
//! - Observed throughput next to the rate the profile should produce
//! - Error classification breakdown
//! - Per-task and per-endpoint tables
//!
//! [`render_summary`] is a pure function: it takes structured data and
//! returns a formatted [`String`]. Color coding respects the global
//! `colored` override set when `--no-color` is active or stdout is piped.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Column width for task and endpoint names in the tables.
const NAME_WIDTH: usize = 34;

/// Render the end-of-run summary.
///
/// # Layout
///
/// ```text
///           /\      |  buch-lasttest
///          /  \     |
///     /\  /    \    |  target:      https://localhost:3000
///    /  \/      \   |  users:       500
///   /    \       \  |  throughput:  0.1 it/s per user
///  /      \       \ |  duration:    60s, 3 tasks
///
///   http_req_duration...................: p50=45ms  p95=200ms  p99=450ms
///   http_req_success_count..............: 16400
///   http_req_error_count................: 12
///   http_req_error_rate.................: 0.1%
///   http_req_throughput.................: 273.5 req/s (expected 277.8)
///   iterations..........................: 49.3 it/s (expected 50.0)
///   http_req_total......................: 16412
///   http_req_elapsed....................: 60.0s
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig, url: &str) -> String {
    let snap = &result.snapshot;
    let mut lines = Vec::new();

    lines.push(render_header(url, config));

    // Latency
    let latency_value = format!("p50={}ms  p95={}ms  p99={}ms", snap.p50, snap.p95, snap.p99);
    let latency_colored = if snap.p99 < 1000 {
        latency_value.green().to_string()
    } else {
        latency_value.yellow().to_string()
    };
    lines.push(format_metric_row("http_req_duration", &latency_colored, PAD_WIDTH));

    lines.push(format_metric_row(
        "http_req_success_count",
        &snap.success_count.to_string().green().to_string(),
        PAD_WIDTH,
    ));

    let error_count_str = if snap.error_count > 0 {
        snap.error_count.to_string().red().to_string()
    } else {
        snap.error_count.to_string()
    };
    lines.push(format_metric_row("http_req_error_count", &error_count_str, PAD_WIDTH));

    let error_rate_pct = snap.error_rate * 100.0;
    lines.push(format_metric_row(
        "http_req_error_rate",
        &color_error_rate(error_rate_pct),
        PAD_WIDTH,
    ));

    // Throughput against what the profile should produce
    let throughput = format!(
        "{} (expected {:.1})",
        format!("{:.1} req/s", result.request_rate()).green(),
        config.expected_request_rate()
    );
    lines.push(format_metric_row("http_req_throughput", &throughput, PAD_WIDTH));

    let iterations = format!(
        "{} (expected {:.1})",
        format!("{:.1} it/s", result.iteration_rate()).green(),
        config.expected_iteration_rate()
    );
    lines.push(format_metric_row("iterations", &iterations, PAD_WIDTH));

    lines.push(format_metric_row(
        "http_req_total",
        &snap.total_requests.to_string(),
        PAD_WIDTH,
    ));
    lines.push(format_metric_row(
        "http_req_elapsed",
        &format!("{:.1}s", result.elapsed.as_secs_f64()),
        PAD_WIDTH,
    ));

    if result.ramp_up.is_none() {
        lines.push(format!(
            "  {}",
            "stopped before all users were spawned; figures include the spawn phase".yellow()
        ));
    }

    // Error breakdown (only when errors exist)
    if !snap.error_category_counts.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = snap.error_category_counts.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("    {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    if !snap.per_task.is_empty() {
        lines.push(String::new());
        lines.push("  per-task metrics:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<NAME_WIDTH$} {:>7} {:>8} {:>8} {:>6} {:>8} {:>8}",
            "task", "iters", "share", "expect", "err%", "it p50", "it p95"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(NAME_WIDTH + 52)));

        for task in &snap.per_task {
            let expected = config
                .find_task(&task.name)
                .map(|t| format!("{:.1}%", config.expected_share(t) * 100.0))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "  {:<NAME_WIDTH$} {:>7} {:>8} {:>8} {:>6} {:>8} {:>8}",
                truncate_name(&task.name),
                task.iterations,
                format!("{:.1}%", task.observed_share * 100.0),
                expected,
                color_error_rate(task.error_rate * 100.0),
                format!("{}ms", task.iteration_p50),
                format!("{}ms", task.iteration_p95),
            ));
        }
    }

    if !snap.per_endpoint.is_empty() {
        let measured_secs = result.measured_secs();
        lines.push(String::new());
        lines.push("  per-endpoint metrics:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<NAME_WIDTH$} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7}",
            "endpoint", "reqs", "rate", "err%", "p50", "p95", "p99"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(NAME_WIDTH + 48)));

        for endpoint in &snap.per_endpoint {
            let rate = if measured_secs > 0.0 {
                endpoint.total_requests as f64 / measured_secs
            } else {
                0.0
            };
            let p99_str = format!("{}ms", endpoint.p99);
            let p99_colored = if endpoint.p99 > 1000 {
                p99_str.yellow().to_string()
            } else {
                p99_str.green().to_string()
            };

            lines.push(format!(
                "  {:<NAME_WIDTH$} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7}",
                truncate_name(&endpoint.name),
                endpoint.total_requests,
                format!("{rate:.1}/s"),
                color_error_rate(endpoint.error_rate * 100.0),
                format!("{}ms", endpoint.p50),
                format!("{}ms", endpoint.p95),
                p99_colored,
            ));
        }
    }

    lines.join("\n")
}

/// Render the ASCII art header with run configuration details.
fn render_header(url: &str, config: &LoadTestConfig) -> String {
    let settings = &config.settings;
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:      {}
   /  \/      \   |  users:       {}
  /    \       \  |  throughput:  {} it/s per user
 /      \       \ |  duration:    {}s, {} tasks
"#,
        "buch-lasttest".bold(),
        url,
        settings.users,
        settings.throughput_per_user,
        settings.duration_secs,
        config.task.len(),
    )
}

/// Red above 5%, yellow above 1%, green otherwise.
fn color_error_rate(pct: f64) -> String {
    let s = format!("{pct:.1}%");
    if pct > 5.0 {
        s.red().to_string()
    } else if pct > 1.0 {
        s.yellow().to_string()
    } else {
        s.green().to_string()
    }
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let head: String = name.chars().take(NAME_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        name.to_string()
    }
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
