//! Retrying fetch cycles.
//!
//! A cycle turns one [`SearchQuery`](crate::search::SearchQuery) into records
//! or a terminal error:
//!
//! - [`RetryStrategy`] / [`RetryState`] - fixed-attempt and exponential-backoff
//!   bookkeeping
//! - [`RetryProgress`] / [`ProgressObserver`] - snapshots for the retry notice
//! - [`RetryOrchestrator`] - the loop that issues requests, waits, and decodes
//! - [`FetchError`] - terminal outcomes

mod error;
mod orchestrator;
mod progress;
mod retry;

pub use error::{ExhaustedRetryError, FetchError};
pub use orchestrator::RetryOrchestrator;
pub use progress::{ProgressObserver, RetryProgress, StrategyKind};
pub use retry::{
    Backoff, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_CAP_SECS, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryState, RetryStrategy,
};
