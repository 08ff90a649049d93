//! Reel-Queue main entry point
//!
//! This is the command-line host for the Reel-Queue download manager.

use anyhow::Context;
use clap::Parser;
use reel_queue::config::{load_config_with_hash, Config};
use reel_queue::output::print_statistics;
use reel_queue::queue::QueueStore;
use reel_queue::DownloadManager;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Reel-Queue: a resilient media download queue
///
/// Downloads the given URLs (and any left over from a previous run) with a
/// bounded pool of workers, retrying transient failures and saving unfinished
/// work when stopped.
#[derive(Parser, Debug)]
#[command(name = "reel-queue")]
#[command(version = "1.0.0")]
#[command(about = "A resilient media download queue", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to download
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// File with one URL per line ('#' starts a comment)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Discard the saved queue from a previous run
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be downloaded without downloading
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let mut urls = cli.urls.clone();
    if let Some(input) = &cli.input {
        urls.extend(read_url_file(input)?);
    }

    if cli.dry_run {
        return handle_dry_run(&config, &urls, cli.fresh);
    }

    if cli.fresh {
        tracing::info!("Discarding saved queue (--fresh)");
        QueueStore::new(&config.persistence.queue_file)
            .clear()
            .context("failed to remove saved queue")?;
    }

    handle_download(config, &urls).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("reel_queue=info,warn"),
            1 => EnvFilter::new("reel_queue=debug,info"),
            2 => EnvFilter::new("reel_queue=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Reads URLs from a file, skipping blank lines and comments
fn read_url_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list {}", path.display()))?;
    Ok(parse_url_list(&content))
}

fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Handles the --dry-run mode: validates config and shows what would be downloaded
fn handle_dry_run(config: &Config, urls: &[String], fresh: bool) -> anyhow::Result<()> {
    println!("=== Reel-Queue Dry Run ===\n");

    println!("Downloader Configuration:");
    println!(
        "  Download directory: {}",
        config.downloader.download_directory.display()
    );
    println!("  Max concurrency: {}", config.downloader.max_concurrency);
    println!("  Max retries: {}", config.downloader.max_retries);
    match config.downloader.max_consecutive_failures {
        0 => println!("  Failure breaker: disabled"),
        n => println!("  Failure breaker: after {} consecutive failures", n),
    }
    println!(
        "  Retry delay: {}ms base, up to {}ms jitter",
        config.downloader.retry_base_delay_ms, config.downloader.retry_jitter_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());
    if !config.headers.is_empty() {
        println!("Extra headers:");
        for (name, value) in &config.headers {
            println!("  {}: {}", name, value);
        }
    }

    let store = QueueStore::new(&config.persistence.queue_file);
    let saved = if fresh {
        Vec::new()
    } else {
        store.load().unwrap_or_else(|e| {
            println!("\n! Saved queue unreadable ({}); it would be ignored", e);
            Vec::new()
        })
    };

    println!("\nSaved queue: {} ({} URLs)", store.path().display(), saved.len());
    for url in &saved {
        println!("  * {}", url);
    }

    println!("\nNew URLs ({}):", urls.len());
    for url in urls {
        match reel_queue::normalize_url(url) {
            Ok(normalized) => println!(
                "  * {} -> {}",
                normalized,
                reel_queue::file_name_for(&normalized)
            ),
            Err(e) => println!("  ! {} (would be rejected: {})", url, e),
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main download operation
async fn handle_download(config: Config, urls: &[String]) -> anyhow::Result<()> {
    let manager = DownloadManager::new(config).context("failed to create download manager")?;

    // Status messages go to the log, standing in for a GUI status line
    let mut events = manager.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("{}", event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Status channel lagged; {} messages skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let accepted = urls.iter().filter(|url| manager.enqueue_url(url)).count();
    tracing::info!(
        "Accepted {} of {} URLs ({} pending in total)",
        accepted,
        urls.len(),
        manager.pending().len()
    );

    manager.complete_adding();
    manager.start().await.context("failed to start downloads")?;

    tokio::select! {
        _ = manager.wait() => {
            tracing::info!("All queued downloads processed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Interrupted; stopping downloads and saving the queue");
            manager.stop().await;
        }
    }

    manager.dispose().await;
    let stats = manager.stats();
    drop(manager);
    let _ = reporter.await;

    print_statistics(&stats);
    Ok(())
}
