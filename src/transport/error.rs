//! Error types for the transport module.
//!
//! Every failure carries the URL that was requested so retry logs and the
//! final error notice can say what went wrong where.

use thiserror::Error;

/// Coarse classification of a transport failure.
///
/// This is what the retry state remembers as the "last failure reason"; the
/// full [`TransportError`] travels with the terminal error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request or response did not complete within the session timeout.
    Timeout,
    /// An established connection dropped mid-request.
    ConnectionLost,
    /// The host could not be reached (DNS failure, connection refused, no route).
    HostUnreachable,
    /// Anything else, including unexpected HTTP status codes.
    Other,
}

impl TransportErrorKind {
    /// Short human-readable label used in notices and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionLost => "connection lost",
            Self::HostUnreachable => "host unreachable",
            Self::Other => "other",
        }
    }
}

/// Errors that can occur while issuing a single request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The connection was dropped while the request was in flight.
    #[error("connection lost requesting {url}: {detail}")]
    ConnectionLost {
        /// The URL being requested.
        url: String,
        /// Description of the underlying failure.
        detail: String,
    },

    /// The host could not be reached at all.
    #[error("host unreachable for {url}: {detail}")]
    HostUnreachable {
        /// The URL being requested.
        url: String,
        /// Description of the underlying failure.
        detail: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Any other transport failure.
    #[error("request to {url} failed: {detail}")]
    Other {
        /// The URL being requested.
        url: String,
        /// Description of the underlying failure.
        detail: String,
    },
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection-lost error.
    pub fn connection_lost(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConnectionLost {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates a host-unreachable error.
    pub fn host_unreachable(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::HostUnreachable {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a catch-all error.
    pub fn other(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Maps a reqwest failure onto the transport taxonomy.
    ///
    /// | reqwest says        | Kind              |
    /// |---------------------|-------------------|
    /// | `is_timeout()`      | Timeout           |
    /// | `is_connect()`      | HostUnreachable   |
    /// | `is_request/body()` | ConnectionLost    |
    /// | carries a status    | HttpStatus        |
    /// | anything else       | Other             |
    pub fn from_reqwest(url: impl Into<String>, error: &reqwest::Error) -> Self {
        let url = url.into();
        if error.is_timeout() {
            Self::timeout(url)
        } else if error.is_connect() {
            Self::host_unreachable(url, error.to_string())
        } else if error.is_request() || error.is_body() {
            Self::connection_lost(url, error.to_string())
        } else if let Some(status) = error.status() {
            Self::http_status(url, status.as_u16())
        } else {
            Self::other(url, error.to_string())
        }
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::ConnectionLost { .. } => TransportErrorKind::ConnectionLost,
            Self::HostUnreachable { .. } => TransportErrorKind::HostUnreachable,
            Self::HttpStatus { .. } | Self::Other { .. } => TransportErrorKind::Other,
        }
    }

    /// Returns the URL the failed request was sent to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Timeout { url }
            | Self::ConnectionLost { url, .. }
            | Self::HostUnreachable { url, .. }
            | Self::HttpStatus { url, .. }
            | Self::Other { url, .. } => url,
        }
    }
}
