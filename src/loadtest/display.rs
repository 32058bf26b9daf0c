//! Live terminal display for load test progress.
//!
//! Renders a compact, in-place updating line showing active users,
//! iterations and requests per second, P95 latency, error count/rate, and
//! elapsed time. Updates every 2 seconds from a watch channel, not
//! per-request.
//!
//! Until the whole population has been spawned, a `[spawning]` prefix is
//! shown.

use crate::loadtest::metrics::MetricsSnapshot;
use crate::loadtest::vu::ActiveVuCounter;

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Live terminal display for load test progress.
pub struct LiveDisplay {
    _multi: MultiProgress,
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let multi = MultiProgress::new();
        let status_bar = multi.add(ProgressBar::new_spinner());
        let style = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        status_bar.set_style(style);
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            _multi: multi,
            status_bar,
        }
    }

    /// Format a single line of live status from a snapshot.
    ///
    /// Rates are averaged over the whole elapsed time. Errors turn red once
    /// any are recorded; P95 turns yellow above one second.
    pub fn format_status(
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_users: u32,
        target_users: u32,
        phase_label: Option<&str>,
    ) -> String {
        let elapsed_secs = elapsed.as_secs_f64();
        let (rps, ips) = if elapsed_secs > 0.0 {
            (
                snap.total_requests as f64 / elapsed_secs,
                snap.total_iterations as f64 / elapsed_secs,
            )
        } else {
            (0.0, 0.0)
        };

        let users_str = format!("{active_users}/{target_users}");
        let p95_str = format!("{}ms", snap.p95);
        let error_count_str = snap.error_count.to_string();
        let error_rate_str = format!("{:.1}%", snap.error_rate * 100.0);

        let p95_display = if snap.p95 > 1000 {
            p95_str.yellow().to_string()
        } else {
            p95_str.green().to_string()
        };
        let error_display = if snap.error_count > 0 {
            format!("{} ({})", error_count_str.red(), error_rate_str.red())
        } else {
            format!("{error_count_str} ({error_rate_str})")
        };

        let metrics_line = format!(
            "users: {}  |  it/s: {}  |  rps: {}  |  p95: {}  |  errors: {}  |  elapsed: {}s",
            users_str.green(),
            format!("{ips:.1}").green(),
            format!("{rps:.1}").green(),
            p95_display,
            error_display,
            elapsed.as_secs()
        );

        match phase_label {
            Some(label) => format!("  [{label}]  {metrics_line}"),
            None => format!("  {metrics_line}"),
        }
    }

    /// Update the display with the latest snapshot.
    pub fn update(
        &self,
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_users: u32,
        target_users: u32,
        phase_label: Option<&str>,
    ) {
        let msg = Self::format_status(snap, elapsed, active_users, target_users, phase_label);
        self.status_bar.set_message(msg);
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop.
///
/// Follows the watch channel and redraws on every published snapshot. Stops
/// when the [`CancellationToken`] is cancelled or the watch sender is dropped.
pub async fn display_loop(
    mut display_rx: watch::Receiver<MetricsSnapshot>,
    active_users: ActiveVuCounter,
    target_users: u32,
    ramp_up_end: Arc<OnceLock<Instant>>,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    // Sender dropped, test is ending
                    break;
                }
                let snap = display_rx.borrow_and_update().clone();
                let active = active_users.get();
                let label = phase_label(&ramp_up_end);
                display.update(&snap, test_start.elapsed(), active, target_users, label);
            }
            _ = cancel.cancelled() => {
                let snap = display_rx.borrow().clone();
                display.update(
                    &snap,
                    test_start.elapsed(),
                    active_users.get(),
                    target_users,
                    Some("stopping"),
                );
                break;
            }
        }
    }

    display.finish();
}

/// `spawning` until the last user has been started, none afterwards.
///
/// Users that exit early lower the active count but never bring the label
/// back.
fn phase_label(ramp_up_end: &OnceLock<Instant>) -> Option<&'static str> {
    ramp_up_end.get().is_none().then_some("spawning")
}
