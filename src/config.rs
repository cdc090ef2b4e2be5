//! Persisted fetch settings.
//!
//! [`FetchConfig`] is read once at the start of every fetch cycle. On disk it
//! is a flat JSON object with camelCase keys; any key left out falls back to
//! its default, so an empty `{}` is a valid file.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::fetch::{
    Backoff, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_CAP_SECS, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_MAX_ATTEMPTS, RetryStrategy,
};
use crate::transport::{DEFAULT_SEARCH_ENDPOINT, DEFAULT_SESSION_TIMEOUT_SECS};

/// Default number of concurrent asset downloads.
pub const DEFAULT_ASSET_CONCURRENCY: usize = 6;

/// Lowest accepted asset concurrency.
pub const MIN_ASSET_CONCURRENCY: usize = 1;

/// Highest accepted asset concurrency.
pub const MAX_ASSET_CONCURRENCY: usize = 100;

/// Highest accepted fixed attempt count.
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;

/// Errors from loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("config file '{path}': {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON or has mistyped values.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The config could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        /// Key as it appears in the file.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Human-readable accepted range.
        expected: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Settings consumed at the start of each fetch cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchConfig {
    /// Requests per cycle under the fixed strategy.
    pub default_number_of_attempts: u32,
    /// Selects exponential backoff instead of fixed attempts.
    pub use_exponential_backoff: bool,
    /// First backoff interval in seconds.
    pub exponential_backoff_base_seconds: f64,
    /// Interval growth factor per failure.
    pub exponential_backoff_multiplier: f64,
    /// Largest interval still attempted, in seconds.
    pub exponential_backoff_cap_seconds: f64,
    /// Request and resource timeout in seconds.
    pub session_timeout_seconds: f64,
    /// Search endpoint; the query is appended as `?q=`.
    pub search_endpoint: String,
    /// Ceiling on concurrent asset downloads.
    pub asset_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_number_of_attempts: DEFAULT_MAX_ATTEMPTS,
            use_exponential_backoff: false,
            exponential_backoff_base_seconds: DEFAULT_BACKOFF_BASE_SECS,
            exponential_backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            exponential_backoff_cap_seconds: DEFAULT_BACKOFF_CAP_SECS,
            session_timeout_seconds: DEFAULT_SESSION_TIMEOUT_SECS,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            asset_concurrency: DEFAULT_ASSET_CONCURRENCY,
        }
    }
}

impl FetchConfig {
    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.default_number_of_attempts) {
            return Err(ConfigError::invalid(
                "defaultNumberOfAttempts",
                self.default_number_of_attempts,
                "range 1..=100",
            ));
        }
        validate_positive_secs(
            "exponentialBackoffBaseSeconds",
            self.exponential_backoff_base_seconds,
        )?;
        validate_positive_secs(
            "exponentialBackoffCapSeconds",
            self.exponential_backoff_cap_seconds,
        )?;
        validate_positive_secs("sessionTimeoutSeconds", self.session_timeout_seconds)?;

        let multiplier = self.exponential_backoff_multiplier;
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(ConfigError::invalid(
                "exponentialBackoffMultiplier",
                multiplier,
                "a finite number greater than 1",
            ));
        }
        if self.exponential_backoff_cap_seconds < self.exponential_backoff_base_seconds {
            return Err(ConfigError::invalid(
                "exponentialBackoffCapSeconds",
                self.exponential_backoff_cap_seconds,
                "a value not below exponentialBackoffBaseSeconds",
            ));
        }
        let backoff = Backoff::new(
            self.exponential_backoff_base_seconds,
            multiplier,
            self.exponential_backoff_cap_seconds,
        );
        if backoff.attempts_within_cap(backoff.base_secs()) > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::invalid(
                "exponentialBackoffMultiplier",
                multiplier,
                "a growth rate reaching the cap within 100 attempts",
            ));
        }
        if !(MIN_ASSET_CONCURRENCY..=MAX_ASSET_CONCURRENCY).contains(&self.asset_concurrency) {
            return Err(ConfigError::invalid(
                "assetConcurrency",
                self.asset_concurrency,
                "range 1..=100",
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    /// Parses the search endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless the endpoint is an absolute
    /// http or https URL.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let invalid =
            || ConfigError::invalid("searchEndpoint", &self.search_endpoint, "an http(s) URL");
        let url = Url::parse(&self.search_endpoint).map_err(|_| invalid())?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(invalid()),
        }
    }

    /// Request timeout; falls back to the default for unusable values.
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.session_timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_SESSION_TIMEOUT_SECS))
    }

    /// Strategy for the next cycle.
    #[must_use]
    pub fn strategy(&self) -> RetryStrategy {
        if self.use_exponential_backoff {
            RetryStrategy::ExponentialBackoff(Backoff::new(
                self.exponential_backoff_base_seconds,
                self.exponential_backoff_multiplier,
                self.exponential_backoff_cap_seconds,
            ))
        } else {
            RetryStrategy::FixedAttempts {
                max_attempts: self.default_number_of_attempts,
            }
        }
    }

    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Like [`FetchConfig::load`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for any failure other than the file not existing.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Writes the config as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, json).map_err(io_error)?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }
}

fn validate_positive_secs(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            value,
            "a finite number of seconds greater than 0",
        ))
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/recipup/config.json`
/// 2. `$HOME/.config/recipup/config.json`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("recipup")
                .join("config.json"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("recipup")
            .join("config.json"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_settings_surface() {
        let config = FetchConfig::default();
        assert_eq!(config.default_number_of_attempts, 3);
        assert!(!config.use_exponential_backoff);
        assert!((config.exponential_backoff_cap_seconds - 10_000.0).abs() < f64::EPSILON);
        assert!((config.session_timeout_seconds - 15.0).abs() < f64::EPSILON);
        assert_eq!(config.search_endpoint, "http://www.recipepuppy.com/api/");
        assert_eq!(config.asset_concurrency, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_selection() {
        let mut config = FetchConfig::default();
        assert_eq!(
            config.strategy(),
            RetryStrategy::FixedAttempts { max_attempts: 3 }
        );

        config.use_exponential_backoff = true;
        config.exponential_backoff_cap_seconds = 500.0;
        assert_eq!(
            config.strategy(),
            RetryStrategy::ExponentialBackoff(Backoff::new(1.0, 10.0, 500.0))
        );
    }

    #[test]
    fn test_session_timeout_conversion() {
        let mut config = FetchConfig {
            session_timeout_seconds: 2.5,
            ..FetchConfig::default()
        };
        assert_eq!(config.session_timeout(), Duration::from_millis(2500));

        config.session_timeout_seconds = -1.0;
        assert_eq!(config.session_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"useExponentialBackoff": true, "defaultNumberOfAttempts": 5}"#)
                .unwrap();
        assert!(config.use_exponential_backoff);
        assert_eq!(config.default_number_of_attempts, 5);
        assert!((config.session_timeout_seconds - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_object_is_default() {
        let config: FetchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, FetchConfig::default());
    }

    // ==================== Validation Tests ====================

    fn assert_invalid(config: &FetchConfig, expected_field: &str) {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
            other => panic!("Expected Invalid({expected_field}), got: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_attempts_out_of_range() {
        for attempts in [0, 101] {
            let config = FetchConfig {
                default_number_of_attempts: attempts,
                ..FetchConfig::default()
            };
            assert_invalid(&config, "defaultNumberOfAttempts");
        }
    }

    #[test]
    fn test_validate_rejects_bad_seconds() {
        let config = FetchConfig {
            session_timeout_seconds: 0.0,
            ..FetchConfig::default()
        };
        assert_invalid(&config, "sessionTimeoutSeconds");

        let config = FetchConfig {
            exponential_backoff_base_seconds: f64::NAN,
            ..FetchConfig::default()
        };
        assert_invalid(&config, "exponentialBackoffBaseSeconds");
    }

    #[test]
    fn test_validate_rejects_multiplier_not_above_one() {
        let config = FetchConfig {
            exponential_backoff_multiplier: 1.0,
            ..FetchConfig::default()
        };
        assert_invalid(&config, "exponentialBackoffMultiplier");
    }

    #[test]
    fn test_validate_rejects_multiplier_too_close_to_one() {
        let config = FetchConfig {
            use_exponential_backoff: true,
            exponential_backoff_multiplier: 1.000_000_001,
            ..FetchConfig::default()
        };
        assert_invalid(&config, "exponentialBackoffMultiplier");

        // 1.1^96 < 10000 < 1.1^97: 97 attempts is still within bounds.
        let config = FetchConfig {
            exponential_backoff_multiplier: 1.1,
            ..FetchConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_cap_below_base() {
        let config = FetchConfig {
            exponential_backoff_base_seconds: 10.0,
            exponential_backoff_cap_seconds: 5.0,
            ..FetchConfig::default()
        };
        assert_invalid(&config, "exponentialBackoffCapSeconds");
    }

    #[test]
    fn test_validate_rejects_concurrency_out_of_range() {
        for concurrency in [0, 101] {
            let config = FetchConfig {
                asset_concurrency: concurrency,
                ..FetchConfig::default()
            };
            assert_invalid(&config, "assetConcurrency");
        }
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        for endpoint in ["not a url", "ftp://example.com/api/"] {
            let config = FetchConfig {
                search_endpoint: endpoint.to_string(),
                ..FetchConfig::default()
            };
            assert_invalid(&config, "searchEndpoint");
        }
    }

    #[test]
    fn test_invalid_error_message() {
        let error = ConfigError::invalid("assetConcurrency", 0, "range 1..=100");
        assert_eq!(
            error.to_string(),
            "invalid config value for `assetConcurrency`: 0. Expected range 1..=100"
        );
    }
}
