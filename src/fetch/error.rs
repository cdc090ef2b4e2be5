//! Error types for fetch cycles.

use thiserror::Error;

use crate::search::{DecodeError, QueryError};
use crate::transport::TransportError;

/// The retry budget ran out without a successful response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("retries exhausted after {attempts} attempt(s){}", describe_last(.last_error))]
pub struct ExhaustedRetryError {
    /// Requests issued during the cycle.
    pub attempts: u32,
    /// The last transport failure observed, if any request was made.
    pub last_error: Option<TransportError>,
}

impl ExhaustedRetryError {
    /// Creates an exhausted-retry error.
    #[must_use]
    pub fn new(attempts: u32, last_error: Option<TransportError>) -> Self {
        Self {
            attempts,
            last_error,
        }
    }
}

fn describe_last(last_error: &Option<TransportError>) -> String {
    last_error
        .as_ref()
        .map(|error| format!(": {error}"))
        .unwrap_or_default()
}

/// Terminal failure of a fetch cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The search term was rejected before any request.
    #[error(transparent)]
    InvalidQuery(#[from] QueryError),

    /// The response arrived but could not be decoded; never retried.
    #[error("could not read search results: {0}")]
    Decode(#[from] DecodeError),

    /// Transport failures used up the retry budget.
    #[error(transparent)]
    Exhausted(#[from] ExhaustedRetryError),

    /// A newer search replaced this one; its outcome is discarded.
    #[error("search was superseded by a newer query")]
    Superseded,

    /// A refresh was requested before any search was made.
    #[error("no search query has been set")]
    NoQuery,
}
