//! Error types for the search module.

use thiserror::Error;

/// The response body could not be decoded into a result envelope.
///
/// Never retried: fetching the same malformed payload again will not fix it.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body is not valid JSON or does not match the envelope shape.
    #[error("malformed search response: {source}")]
    Malformed {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Creates a malformed-payload error.
    pub fn malformed(source: serde_json::Error) -> Self {
        Self::Malformed { source }
    }
}

/// A search term was rejected before any request was made.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Term is empty or whitespace only.
    #[error("search query is empty")]
    Empty,
}
