//! CLI entry point for recipup.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use recipup_core::config::{FetchConfig, default_config_path};
use recipup_core::dispatch::MainQueue;
use recipup_core::fetch::RetryProgress;
use recipup_core::search::Record;
use recipup_core::session::RecipeSearch;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;
    let (main_queue, _actor) = MainQueue::spawn();
    let search = RecipeSearch::with_http(config, main_queue.clone())
        .context("Failed to start search session")?;

    let spinner = make_spinner(args.quiet);
    {
        let spinner = spinner.clone();
        search.on_retry_progress(move |progress: RetryProgress| {
            if let Some(notice) = progress.message() {
                spinner.set_message(notice);
            }
        });
    }

    let query = args.query_text();
    spinner.set_message(format!("Searching for '{query}'..."));
    let outcome = search.search(&query).await;
    spinner.finish_and_clear();

    let records = outcome.with_context(|| format!("Search for '{query}' failed"))?;
    info!(query = %query, results = records.len(), "search complete");
    print_records(&records);

    if args.assets > 0 {
        fetch_assets(&search, args.assets.min(records.len())).await;
        main_queue.flush().await;
        let stats = search.asset_stats();
        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            "thumbnail fetch complete"
        );
    }

    Ok(())
}

/// Resolves the effective config: flags > file > defaults.
fn load_config(args: &Args) -> Result<FetchConfig> {
    let file_config = match (&args.config, default_config_path()) {
        (Some(path), _) => FetchConfig::load(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        (None, Some(path)) => FetchConfig::load_or_default(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        (None, None) => FetchConfig::default(),
    };

    let config = args.apply_overrides(file_config);
    config.validate().context("Invalid settings")?;
    debug!(?config, "effective configuration");
    Ok(config)
}

fn make_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("No recipes found.");
        return;
    }
    for (index, record) in records.iter().enumerate() {
        println!(
            "{:>3}. {}",
            index + 1,
            record.title.as_deref().map_or("(untitled)", str::trim)
        );
        if let Some(description) = record.description.as_deref().map(str::trim)
            && !description.is_empty()
        {
            println!("     {description}");
        }
    }
}

/// Requests thumbnails for the first `count` items and reports their sizes.
async fn fetch_assets(search: &RecipeSearch, count: usize) {
    let mut pending = Vec::with_capacity(count);
    for index in 0..count {
        let (data_tx, data_rx) = oneshot::channel();
        search.request_asset(index, move |data| {
            let _ = data_tx.send(data.len());
        });
        pending.push((index, data_rx));
    }

    for (index, data_rx) in pending {
        match data_rx.await {
            Ok(bytes) => println!("thumbnail {}: {bytes} bytes", index + 1),
            Err(_) => warn!(item = index + 1, "thumbnail unavailable"),
        }
    }
}
