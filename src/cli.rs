//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use recipup_core::config::FetchConfig;

/// Search recipes with automatic retry and lazy thumbnail fetching.
///
/// Flags override values from the config file, which override built-in
/// defaults.
#[derive(Parser, Debug)]
#[command(name = "recipup")]
#[command(author, version, about)]
pub struct Args {
    /// Search terms (joined with spaces)
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (JSON); defaults to $XDG_CONFIG_HOME/recipup/config.json
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Requests per search under the fixed strategy (1-100)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_attempts: Option<u32>,

    /// Retry with exponential backoff instead of a fixed attempt count
    #[arg(short = 'e', long)]
    pub exponential: bool,

    /// Largest backoff interval still attempted, in seconds
    #[arg(long, value_name = "SECS")]
    pub backoff_cap: Option<f64>,

    /// Request timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Search endpoint URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Fetch thumbnails of the first N results
    #[arg(short = 'a', long, value_name = "N", default_value_t = 0)]
    pub assets: usize,

    /// Maximum concurrent thumbnail downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,
}

impl Args {
    /// The search term as typed, words joined by single spaces.
    #[must_use]
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }

    /// Applies command-line overrides on top of `config`.
    #[must_use]
    pub fn apply_overrides(&self, mut config: FetchConfig) -> FetchConfig {
        if let Some(max_attempts) = self.max_attempts {
            config.default_number_of_attempts = max_attempts;
        }
        if self.exponential {
            config.use_exponential_backoff = true;
        }
        if let Some(cap) = self.backoff_cap {
            config.exponential_backoff_cap_seconds = cap;
        }
        if let Some(timeout) = self.timeout {
            config.session_timeout_seconds = timeout;
        }
        if let Some(endpoint) = &self.endpoint {
            config.search_endpoint.clone_from(endpoint);
        }
        if let Some(concurrency) = self.concurrency {
            config.asset_concurrency = usize::from(concurrency);
        }
        config
    }
}
