//! Search terms, result records, and the response decoder.
//!
//! - [`SearchQuery`] - validated, trimmed search term
//! - [`Record`] / [`ResultEnvelope`] - decoded response shape
//! - [`decode`] - pure body-to-envelope decoder
//!
//! # Example
//!
//! ```
//! use recipup_core::search::{decode, SearchQuery};
//! use url::Url;
//!
//! let query = SearchQuery::new("  bacon pie ").unwrap();
//! let endpoint = Url::parse("http://www.recipepuppy.com/api/").unwrap();
//! assert_eq!(
//!     query.search_url(&endpoint).as_str(),
//!     "http://www.recipepuppy.com/api/?q=bacon%20pie"
//! );
//!
//! let envelope = decode(br#"{"href":"http://www.recipepuppy.com/"}"#).unwrap();
//! assert!(envelope.into_records().is_empty());
//! ```

mod error;
mod record;

pub use error::{DecodeError, QueryError};
pub use record::{Record, ResultEnvelope, decode};

use std::fmt;

use url::Url;

/// A non-empty, trimmed search term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Validates and trims `term`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Empty`] if nothing is left after trimming.
    pub fn new(term: &str) -> Result<Self, QueryError> {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the trimmed term.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds `<endpoint>?q=<percent-encoded term>`, replacing any existing query.
    #[must_use]
    pub fn search_url(&self, endpoint: &Url) -> Url {
        let mut url = endpoint.clone();
        let encoded = urlencoding::encode(&self.0);
        url.set_query(Some(&format!("q={encoded}")));
        url
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
