//! Constants for the transport module (timeouts, endpoints).

/// Default session timeout in seconds, used for both request and resource timeouts.
pub const DEFAULT_SESSION_TIMEOUT_SECS: f64 = 15.0;

/// Default recipe search endpoint; the query is appended as `?q=<term>`.
pub const DEFAULT_SEARCH_ENDPOINT: &str = "http://www.recipepuppy.com/api/";
