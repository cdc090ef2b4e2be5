//! Retry progress snapshots and observers.

/// Which retry strategy produced a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Fixed number of immediate attempts.
    FixedAttempts,
    /// Exponentially growing waits up to a cap.
    ExponentialBackoff,
}

/// What a caller needs to render the retry notice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryProgress {
    /// True while a failure streak is being retried.
    pub in_progress: bool,
    /// Attempts left, including the next one.
    pub attempts_remaining: u32,
    /// Wait before the next attempt (exponential strategy; 0 for fixed).
    pub next_interval_seconds: f64,
    /// Strategy in effect for the cycle.
    pub strategy: StrategyKind,
}

impl Default for RetryProgress {
    fn default() -> Self {
        Self {
            in_progress: false,
            attempts_remaining: 0,
            next_interval_seconds: 0.0,
            strategy: StrategyKind::FixedAttempts,
        }
    }
}

impl RetryProgress {
    /// Text for the transient retry notice, or `None` when no retry is running.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        if !self.in_progress {
            return None;
        }
        let detail = match self.strategy {
            StrategyKind::FixedAttempts if self.attempts_remaining <= 1 => {
                "Last attempt.".to_string()
            }
            StrategyKind::FixedAttempts => {
                format!("{} attempt(s) remaining.", self.attempts_remaining)
            }
            StrategyKind::ExponentialBackoff => {
                format!("Next retry in {} seconds.", self.next_interval_seconds)
            }
        };
        Some(format!("Retry in progress. {detail}"))
    }
}

/// Receives progress snapshots from a running fetch cycle.
///
/// Called synchronously by the orchestrator at every transition; implementations
/// that talk to a UI should hand the snapshot to the UI queue rather than
/// rendering inline.
pub trait ProgressObserver: Send + Sync {
    /// Handles one snapshot.
    fn on_progress(&self, progress: RetryProgress);
}

impl<F> ProgressObserver for F
where
    F: Fn(RetryProgress) + Send + Sync,
{
    fn on_progress(&self, progress: RetryProgress) {
        self(progress);
    }
}

/// Forwards a snapshot only when it differs from the previous one.
pub(crate) struct ProgressReporter<'a> {
    observer: &'a dyn ProgressObserver,
    last: Option<RetryProgress>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            last: None,
        }
    }

    pub(crate) fn report(&mut self, progress: RetryProgress) {
        if self.last == Some(progress) {
            return;
        }
        self.last = Some(progress);
        self.observer.on_progress(progress);
    }
}
