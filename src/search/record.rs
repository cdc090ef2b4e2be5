//! Search result records and the response decoder.

use serde::{Deserialize, Serialize};

use super::error::DecodeError;

/// One search hit.
///
/// The remote API names the description `ingredients` and the asset URL
/// `thumbnail`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Free-text description (ingredient list for recipes).
    #[serde(default, alias = "ingredients")]
    pub description: Option<String>,
    /// URL of the secondary asset (thumbnail image).
    #[serde(default, rename = "assetURL", alias = "thumbnail")]
    pub asset_url: Option<String>,
}

impl Record {
    /// Returns the asset URL if present and non-blank.
    #[must_use]
    pub fn asset_url(&self) -> Option<&str> {
        self.asset_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Outer shape of a decoded search response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultEnvelope {
    /// API title.
    #[serde(default)]
    pub title: Option<String>,
    /// API version.
    #[serde(default)]
    pub version: Option<f32>,
    /// Canonical API link.
    pub href: String,
    /// Result list; absent means "no results", not an error.
    #[serde(default)]
    pub results: Option<Vec<Record>>,
}

impl ResultEnvelope {
    /// Consumes the envelope, returning its records (empty when absent).
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.results.unwrap_or_default()
    }
}

/// Decodes a response body into a [`ResultEnvelope`].
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the body is not JSON or lacks the
/// envelope shape.
pub fn decode(body: &[u8]) -> Result<ResultEnvelope, DecodeError> {
    serde_json::from_slice(body).map_err(DecodeError::malformed)
}
