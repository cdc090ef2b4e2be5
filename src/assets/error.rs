//! Error types for the asset queue.

use thiserror::Error;

use crate::config::{MAX_ASSET_CONCURRENCY, MIN_ASSET_CONCURRENCY};

/// Errors from asset queue construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid asset concurrency {value}: must be between {MIN_ASSET_CONCURRENCY} and {MAX_ASSET_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}
