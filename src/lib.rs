//! recipup core library
//!
//! Retrying recipe search with lazily fetched, cancellable thumbnails.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaves first:
//! - [`transport`] - single-shot HTTP requests with a typed failure taxonomy
//! - [`search`] - search terms, result records, and the response decoder
//! - [`fetch`] - retry strategies and the retrying fetch orchestrator
//! - [`assets`] - bounded, de-duplicated, cancellable asset downloads
//! - [`dispatch`] - the serial queue that delivers caller-visible effects
//! - [`config`] - persisted fetch settings
//! - [`session`] - the facade tying search, retry progress, and assets together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod search;
pub mod session;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use assets::{AssetData, AssetError, AssetQueue, AssetRequest, TaskState};
pub use config::{ConfigError, FetchConfig};
pub use dispatch::MainQueue;
pub use fetch::{
    Backoff, ExhaustedRetryError, FetchError, ProgressObserver, RetryOrchestrator, RetryProgress,
    RetryStrategy,
};
pub use search::{DecodeError, QueryError, Record, ResultEnvelope, SearchQuery, decode};
pub use session::{RecipeSearch, SessionError};
pub use transport::{FetchRequest, HttpTransport, Transport, TransportError, TransportErrorKind};
