//! Retry strategies and the per-cycle retry state machine.
//!
//! This module provides [`RetryStrategy`] and [`RetryState`]. The state is a
//! plain value with a single writer (the orchestrator); it never sleeps or
//! performs I/O itself, it only answers "what next?" after each attempt.
//!
//! # Strategies
//!
//! - [`RetryStrategy::FixedAttempts`] - up to `max_attempts` requests, retried
//!   back to back with no delay.
//! - [`RetryStrategy::ExponentialBackoff`] - the first request fires at once;
//!   after each failure the interval is multiplied and the next request waits
//!   that long, until the interval would pass the cap.
//!
//! # Example
//!
//! ```
//! use recipup_core::fetch::{Backoff, RetryDecision, RetryState, RetryStrategy};
//! use recipup_core::transport::TransportErrorKind;
//! use std::time::Duration;
//!
//! let mut state = RetryState::new(RetryStrategy::ExponentialBackoff(Backoff::default()));
//! state.begin_attempt();
//! assert_eq!(
//!     state.record_failure(TransportErrorKind::Timeout),
//!     RetryDecision::RetryAfter(Duration::from_secs(10))
//! );
//! ```

use std::time::Duration;

use tracing::debug;

use super::progress::{RetryProgress, StrategyKind};
use crate::transport::TransportErrorKind;

/// Default number of attempts for the fixed strategy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base interval for exponential backoff (1 second).
pub const DEFAULT_BACKOFF_BASE_SECS: f64 = 1.0;

/// Default backoff multiplier (x10 per failure).
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Default interval cap for exponential backoff (10000 seconds).
pub const DEFAULT_BACKOFF_CAP_SECS: f64 = 10_000.0;

/// Parameters of the exponential-backoff strategy.
///
/// # Default Values
///
/// - `base_secs`: 1.0
/// - `multiplier`: 10.0
/// - `cap_secs`: 10000.0
///
/// Attempt `k` (1-indexed) belongs to interval `base * multiplier^(k-1)`.
/// Attempt 1 fires immediately; every later attempt waits its interval. With
/// defaults the attempts belong to 1, 10, 100, 1000, 10000 and the cycle stops
/// before the 100000 one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base_secs: f64,
    multiplier: f64,
    cap_secs: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_secs: DEFAULT_BACKOFF_BASE_SECS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            cap_secs: DEFAULT_BACKOFF_CAP_SECS,
        }
    }
}

impl Backoff {
    /// Creates backoff parameters.
    ///
    /// Out-of-range values are replaced rather than rejected: a non-positive
    /// or non-finite base or a multiplier not above 1 falls back to the
    /// default, and a cap below the base is raised to the base so the first
    /// attempt is always allowed.
    #[must_use]
    pub fn new(base_secs: f64, multiplier: f64, cap_secs: f64) -> Self {
        let base_secs = if base_secs.is_finite() && base_secs > 0.0 {
            base_secs
        } else {
            DEFAULT_BACKOFF_BASE_SECS
        };
        let multiplier = if multiplier.is_finite() && multiplier > 1.0 {
            multiplier
        } else {
            DEFAULT_BACKOFF_MULTIPLIER
        };
        let cap_secs = if cap_secs.is_finite() {
            cap_secs.max(base_secs)
        } else {
            DEFAULT_BACKOFF_CAP_SECS.max(base_secs)
        };
        Self {
            base_secs,
            multiplier,
            cap_secs,
        }
    }

    /// Base interval in seconds.
    #[must_use]
    pub fn base_secs(&self) -> f64 {
        self.base_secs
    }

    /// Growth factor applied after each failure.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Largest interval that is still attempted.
    #[must_use]
    pub fn cap_secs(&self) -> f64 {
        self.cap_secs
    }

    /// Counts attempts left when the current interval is `interval_secs`,
    /// including the attempt that belongs to `interval_secs` itself.
    ///
    /// Computed in closed form; saturates at `u32::MAX` for schedules that
    /// never reach the cap within that many steps.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn attempts_within_cap(&self, interval_secs: f64) -> u32 {
        if interval_secs.is_nan() || interval_secs > self.cap_secs {
            return 0;
        }
        if interval_secs <= 0.0 {
            return u32::MAX;
        }

        let mut steps = ((self.cap_secs / interval_secs).ln() / self.multiplier.ln())
            .floor()
            .max(0.0);
        // The logarithm quotient can land a hair off an exact power of the multiplier.
        if interval_secs * self.multiplier.powf(steps) > self.cap_secs {
            steps -= 1.0;
        } else if interval_secs * self.multiplier.powf(steps + 1.0) <= self.cap_secs {
            steps += 1.0;
        }

        if steps >= f64::from(u32::MAX) {
            return u32::MAX;
        }
        (steps as u32).saturating_add(1)
    }
}

/// Policy governing whether and when to retry after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryStrategy {
    /// Retry immediately until `max_attempts` requests have been made.
    FixedAttempts {
        /// Total number of requests allowed, including the first.
        max_attempts: u32,
    },
    /// Retry after exponentially growing waits until the cap is passed.
    ExponentialBackoff(Backoff),
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::FixedAttempts {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryStrategy {
    /// Returns which strategy family this is.
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::FixedAttempts { .. } => StrategyKind::FixedAttempts,
            Self::ExponentialBackoff(_) => StrategyKind::ExponentialBackoff,
        }
    }
}

/// What the orchestrator should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-issue the request right away.
    RetryNow,
    /// Re-issue the request once the delay has elapsed.
    RetryAfter(Duration),
    /// Stop; the cycle ends in exhausted failure.
    Exhausted,
}

/// Mutable retry bookkeeping for one fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    strategy: RetryStrategy,
    attempts_remaining: u32,
    current_interval_secs: f64,
    is_first_attempt: bool,
    retry_in_progress: bool,
    last_failure: Option<TransportErrorKind>,
    attempts_made: u32,
}

impl RetryState {
    /// Creates the initial state of a cycle run under `strategy`.
    #[must_use]
    pub fn new(strategy: RetryStrategy) -> Self {
        let (attempts_remaining, current_interval_secs) = match strategy {
            RetryStrategy::FixedAttempts { max_attempts } => (max_attempts, 0.0),
            RetryStrategy::ExponentialBackoff(backoff) => (
                backoff.attempts_within_cap(backoff.base_secs),
                backoff.base_secs,
            ),
        };
        Self {
            strategy,
            attempts_remaining,
            current_interval_secs,
            is_first_attempt: true,
            retry_in_progress: false,
            last_failure: None,
            attempts_made: 0,
        }
    }

    /// Returns whether a request may be issued at all.
    ///
    /// Only false for a fixed strategy configured with zero attempts.
    #[must_use]
    pub fn can_attempt(&self) -> bool {
        self.attempts_remaining > 0
    }

    /// Marks the start of a request and returns its 1-indexed attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.is_first_attempt = false;
        self.attempts_made += 1;
        self.attempts_made
    }

    /// Applies the strategy to a failed attempt.
    pub fn record_failure(&mut self, reason: TransportErrorKind) -> RetryDecision {
        self.last_failure = Some(reason);

        match self.strategy {
            RetryStrategy::FixedAttempts { .. } => {
                if self.attempts_remaining.saturating_sub(1) == 0 {
                    self.attempts_remaining = 0;
                    self.retry_in_progress = false;
                    debug!(attempts = self.attempts_made, "fixed attempts exhausted");
                    return RetryDecision::Exhausted;
                }
                self.attempts_remaining -= 1;
                self.retry_in_progress = true;
                RetryDecision::RetryNow
            }
            RetryStrategy::ExponentialBackoff(backoff) => {
                self.current_interval_secs *= backoff.multiplier;
                self.retry_in_progress = true;

                if self.current_interval_secs > backoff.cap_secs {
                    debug!(
                        interval_secs = self.current_interval_secs,
                        cap_secs = backoff.cap_secs,
                        "backoff interval passed cap"
                    );
                    self.current_interval_secs = backoff.base_secs;
                    self.attempts_remaining = 0;
                    self.retry_in_progress = false;
                    return RetryDecision::Exhausted;
                }

                self.attempts_remaining = backoff.attempts_within_cap(self.current_interval_secs);
                let delay = Duration::try_from_secs_f64(self.current_interval_secs)
                    .unwrap_or(Duration::MAX);
                RetryDecision::RetryAfter(delay)
            }
        }
    }

    /// Records a successful attempt; resets the backoff interval.
    pub fn record_success(&mut self) {
        self.retry_in_progress = false;
        if let RetryStrategy::ExponentialBackoff(backoff) = self.strategy {
            self.current_interval_secs = backoff.base_secs;
        }
    }

    /// Records a failure that ends the cycle without retry (undecodable body).
    pub fn record_fatal(&mut self) {
        self.retry_in_progress = false;
    }

    /// Snapshot for progress observers.
    #[must_use]
    pub fn progress(&self) -> RetryProgress {
        RetryProgress {
            in_progress: self.retry_in_progress,
            attempts_remaining: self.attempts_remaining,
            next_interval_seconds: self.current_interval_secs,
            strategy: self.strategy.kind(),
        }
    }

    /// The strategy this cycle runs under.
    #[must_use]
    pub fn strategy(&self) -> RetryStrategy {
        self.strategy
    }

    /// Attempts left, including the next one.
    #[must_use]
    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    /// Current backoff interval in seconds (0 under the fixed strategy).
    #[must_use]
    pub fn current_interval_secs(&self) -> f64 {
        self.current_interval_secs
    }

    /// True until the first request has been issued.
    #[must_use]
    pub fn is_first_attempt(&self) -> bool {
        self.is_first_attempt
    }

    /// True while a failure streak is being retried.
    #[must_use]
    pub fn retry_in_progress(&self) -> bool {
        self.retry_in_progress
    }

    /// Classification of the most recent failure, if any.
    #[must_use]
    pub fn last_failure(&self) -> Option<TransportErrorKind> {
        self.last_failure
    }

    /// Requests issued so far in this cycle.
    #[must_use]
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }
}
