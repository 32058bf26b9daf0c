//! Constant-throughput pacing for virtual users.
//!
//! A user capped at `r` iterations per second has a period of `1/r`. After
//! each iteration it sleeps for whatever is left of the period, measured
//! from the iteration's start. Iterations that overrun the period are
//! followed immediately by the next one; lost time is never caught up.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-user iteration rate cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantThroughput {
    period: Duration,
}

impl ConstantThroughput {
    /// Pacer for `iterations_per_sec` iterations per second.
    ///
    /// Non-positive or non-finite rates disable pacing.
    pub fn new(iterations_per_sec: f64) -> Self {
        let period = if iterations_per_sec.is_finite() && iterations_per_sec > 0.0 {
            Duration::from_secs_f64(1.0 / iterations_per_sec)
        } else {
            Duration::ZERO
        };
        Self { period }
    }

    /// Target time between iteration starts.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left to wait after an iteration that ran for `busy`.
    pub fn wait_time(&self, busy: Duration) -> Duration {
        self.period.saturating_sub(busy)
    }

    /// Sleep until the next iteration may start.
    ///
    /// Returns `false` if `cancel` fired during the wait.
    pub async fn pace(&self, iteration_start: Instant, cancel: &CancellationToken) -> bool {
        let wait = self.wait_time(iteration_start.elapsed());
        if wait.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = cancel.cancelled() => false,
        }
    }
}
