//! Single-shot HTTP transport.
//!
//! A [`Transport`] issues exactly one request per call and reports a typed
//! outcome. It never retries on its own; deciding whether a failure deserves
//! another attempt is the job of [`crate::fetch`].
//!
//! - [`HttpTransport`] - production implementation over reqwest
//! - [`TransportError`] - failure taxonomy (timeout, connection lost, host unreachable, other)

mod client;
mod constants;
mod error;
#[cfg(test)]
pub(crate) mod fake;

pub use client::HttpTransport;
pub use constants::{DEFAULT_SEARCH_ENDPOINT, DEFAULT_SESSION_TIMEOUT_SECS};
pub use error::{TransportError, TransportErrorKind};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

/// A fully-formed request: method, URL, timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Upper bound for the whole request/response exchange.
    pub timeout: Duration,
}

impl FetchRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: Url, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url,
            timeout,
        }
    }
}

/// Issues one request and returns the response body.
///
/// Implementations must complete exactly once per call and must not retry
/// internally.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends `request` and returns the response body on a success status.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] classifying the failure.
    async fn send(&self, request: &FetchRequest) -> Result<Vec<u8>, TransportError>;
}
