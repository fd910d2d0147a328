//! Adaptive pacing between requests to a service with an unannounced rate limit.
//!
//! The [`ThrottleController`] turns each request outcome into the delay that
//! must elapse before the next item is attempted. It is an asymmetric control
//! loop:
//!
//! - rate-limit signals double the delay immediately;
//! - other failures back off proportionally to the current failure streak,
//!   capped at a 2.5x step;
//! - content failures never move the delay;
//! - successes only shrink the delay after a streak, and more gently when the
//!   measured hourly throughput is already above target.
//!
//! The state transition itself is a pure function of `(state, outcome, now)`
//! ([`ThrottleState::step`]); the controller only binds it to a [`Clock`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use archiver_core::config::PacingConfig;
//! use archiver_core::pacing::{ThrottleController, TokioClock};
//!
//! let mut throttle = ThrottleController::new(PacingConfig::default(), Arc::new(TokioClock));
//! assert_eq!(throttle.current_delay(), Duration::from_secs(4));
//!
//! let next = throttle.update(false, "HTTP Error 429: Too Many Requests");
//! assert_eq!(next, Duration::from_secs(8));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Clock;
use crate::config::PacingConfig;
use crate::failure::{FailureKind, classify};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Reduction applied on a streak when throughput is already above target.
const GENTLE_REDUCTION: f64 = 0.05;

/// Reduction applied on a streak when throughput is at or below target.
const STREAK_REDUCTION: f64 = 0.15;

/// Cap on the consecutive-failure multiplier for generic failures.
const MAX_FAILURE_MULTIPLIER: u32 = 3;

/// Throughput below this fraction of target is reported.
const BEHIND_TARGET_RATIO: f64 = 0.8;

/// One observation fed into the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingOutcome {
    Success,
    Failure(FailureKind),
}

impl PacingOutcome {
    /// Builds an outcome from the raw `(success, error_text)` pair.
    #[must_use]
    pub fn from_raw(success: bool, error_text: &str) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure(classify(error_text))
        }
    }
}

/// Snapshot of the controller for logs and the session summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStats {
    pub current_delay_secs: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub rate_limit_hits: u64,
    pub recent_failures: usize,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub hourly_rate: f64,
}

/// In-memory pacing state. Created once per run and never persisted.
#[derive(Debug, Clone)]
pub struct ThrottleState {
    current_delay: f64,
    consecutive_successes: u32,
    consecutive_failures: u32,
    /// Oldest first.
    failure_times: VecDeque<Instant>,
    /// Oldest first.
    success_times: VecDeque<Instant>,
    success_count: u64,
    failure_count: u64,
    rate_limit_hits: u64,
}

impl ThrottleState {
    /// Fresh state starting at the configured initial delay.
    #[must_use]
    pub fn new(config: &PacingConfig) -> Self {
        Self {
            current_delay: bounded(config.initial_delay_secs, config),
            consecutive_successes: 0,
            consecutive_failures: 0,
            failure_times: VecDeque::new(),
            success_times: VecDeque::new(),
            success_count: 0,
            failure_count: 0,
            rate_limit_hits: 0,
        }
    }

    /// Pure transition: returns the next state and the delay to apply.
    #[must_use]
    pub fn step(
        &self,
        config: &PacingConfig,
        outcome: PacingOutcome,
        now: Instant,
    ) -> (ThrottleState, Duration) {
        let mut next = self.clone();
        let delay = next.apply(config, outcome, now);
        (next, delay)
    }

    #[must_use]
    pub fn current_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.current_delay).unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[must_use]
    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    #[must_use]
    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits
    }

    fn apply(&mut self, config: &PacingConfig, outcome: PacingOutcome, now: Instant) -> Duration {
        prune(&mut self.failure_times, config.failure_window(), now);
        prune(&mut self.success_times, config.success_window(), now);

        match outcome {
            PacingOutcome::Failure(kind) => self.apply_failure(config, kind, now),
            PacingOutcome::Success => self.apply_success(config, now),
        }

        self.current_delay = bounded(self.current_delay, config);
        self.current_delay()
    }

    fn apply_failure(&mut self, config: &PacingConfig, kind: FailureKind, now: Instant) {
        self.failure_count += 1;

        if kind == FailureKind::ContentInvalid {
            self.consecutive_failures = 0;
            info!(
                delay_secs = self.current_delay,
                "content-related failure, keeping current delay"
            );
            return;
        }

        self.consecutive_successes = 0;
        self.consecutive_failures += 1;
        self.failure_times.push_back(now);

        if kind == FailureKind::RateLimited {
            self.rate_limit_hits += 1;
            self.current_delay = (self.current_delay * 2.0).min(config.max_delay_secs);
            warn!(
                delay_secs = self.current_delay,
                rate_limit_hits = self.rate_limit_hits,
                "rate limit detected, doubling delay"
            );
        } else {
            let multiplier = self.consecutive_failures.min(MAX_FAILURE_MULTIPLIER);
            let factor = 1.0 + 0.5 * f64::from(multiplier);
            self.current_delay = (self.current_delay * factor).min(config.max_delay_secs);
            warn!(
                kind = %kind,
                consecutive_failures = self.consecutive_failures,
                delay_secs = self.current_delay,
                "failure, increasing delay"
            );
        }
    }

    fn apply_success(&mut self, config: &PacingConfig, now: Instant) {
        self.success_count += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.success_times.push_back(now);
        prune(&mut self.success_times, config.success_window(), now);

        if self.success_times.len() < config.warmup_samples {
            debug!(
                samples = self.success_times.len(),
                "warming up, no rate adjustment"
            );
            return;
        }

        let hourly_rate = self.hourly_rate(config, now);
        let target = f64::from(config.target_hourly_rate);
        let streak_reached = self.consecutive_successes >= config.streak_threshold;

        let reduction = if hourly_rate > target {
            GENTLE_REDUCTION
        } else if streak_reached {
            STREAK_REDUCTION
        } else {
            GENTLE_REDUCTION
        };

        if streak_reached {
            self.current_delay = (self.current_delay * (1.0 - reduction)).max(config.min_delay_secs);
            info!(
                streak = self.consecutive_successes,
                reduction,
                hourly_rate,
                delay_secs = self.current_delay,
                "success streak, reducing delay"
            );
        }

        if hourly_rate < target * BEHIND_TARGET_RATIO {
            warn!(
                hourly_rate,
                target = config.target_hourly_rate,
                "behind target download rate"
            );
        }
    }

    /// Estimated successful downloads per hour.
    ///
    /// Below the warm-up sample count the target is returned, so early noise
    /// never triggers an adjustment. While the oldest sample is younger than
    /// the extrapolation window the count is scaled to an hour, dividing by at
    /// least `min_extrapolation_secs` so a quick burst cannot report an
    /// absurd rate.
    fn hourly_rate(&self, config: &PacingConfig, now: Instant) -> f64 {
        let samples = self.success_times.len();
        if samples < config.warmup_samples {
            return f64::from(config.target_hourly_rate);
        }
        let Some(oldest) = self.success_times.front() else {
            return f64::from(config.target_hourly_rate);
        };

        #[allow(clippy::cast_precision_loss)]
        let count = samples as f64;
        let elapsed = now.saturating_duration_since(*oldest).as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let extrapolation_window = config.extrapolation_window_secs as f64;

        if elapsed < extrapolation_window {
            #[allow(clippy::cast_precision_loss)]
            let floor = config.min_extrapolation_secs.max(1) as f64;
            count * (SECONDS_PER_HOUR / elapsed.max(floor))
        } else {
            count
        }
    }

    fn stats(&self, config: &PacingConfig, now: Instant) -> ThrottleStats {
        let mut successes = self.success_times.clone();
        prune(&mut successes, config.success_window(), now);
        let mut failures = self.failure_times.clone();
        prune(&mut failures, config.failure_window(), now);
        let windowed = Self {
            success_times: successes,
            failure_times: failures,
            ..self.clone()
        };

        ThrottleStats {
            current_delay_secs: self.current_delay,
            success_count: self.success_count,
            failure_count: self.failure_count,
            rate_limit_hits: self.rate_limit_hits,
            recent_failures: windowed.failure_times.len(),
            consecutive_successes: self.consecutive_successes,
            consecutive_failures: self.consecutive_failures,
            hourly_rate: windowed.hourly_rate(config, now),
        }
    }
}

/// Keeps `delay` inside `[min, max]` without panicking on inverted bounds.
fn bounded(delay: f64, config: &PacingConfig) -> f64 {
    delay.max(config.min_delay_secs).min(config.max_delay_secs)
}

/// Drops timestamps that are at least `window` old.
fn prune(times: &mut VecDeque<Instant>, window: Duration, now: Instant) {
    while let Some(oldest) = times.front() {
        if now.saturating_duration_since(*oldest) < window {
            break;
        }
        times.pop_front();
    }
}

/// Pacing controller bound to a clock.
#[derive(Debug)]
pub struct ThrottleController {
    config: PacingConfig,
    state: ThrottleState,
    clock: Arc<dyn Clock>,
}

impl ThrottleController {
    #[must_use]
    pub fn new(config: PacingConfig, clock: Arc<dyn Clock>) -> Self {
        debug!(
            initial = config.initial_delay_secs,
            min = config.min_delay_secs,
            max = config.max_delay_secs,
            "creating throttle controller"
        );
        Self {
            state: ThrottleState::new(&config),
            config,
            clock,
        }
    }

    /// Classifies `error_text` (when `success` is false) and records the outcome.
    pub fn update(&mut self, success: bool, error_text: &str) -> Duration {
        self.record(PacingOutcome::from_raw(success, error_text))
    }

    /// Records a typed outcome at the clock's current time.
    pub fn record(&mut self, outcome: PacingOutcome) -> Duration {
        let now = self.clock.now();
        self.record_at(outcome, now)
    }

    /// Records a typed outcome at an explicit time.
    pub fn record_at(&mut self, outcome: PacingOutcome, now: Instant) -> Duration {
        let (next, delay) = self.state.step(&self.config, outcome, now);
        self.state = next;
        delay
    }

    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.state.current_delay()
    }

    #[must_use]
    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    #[must_use]
    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> ThrottleStats {
        self.state.stats(&self.config, self.clock.now())
    }
}
