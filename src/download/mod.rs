//! Download module: fetching queued URLs to disk
//!
//! This module contains the core download pipeline, including:
//! - HTTP fetching with streamed writes to disk
//! - Retry classification and exponential backoff with jitter
//! - A failure breaker that aborts a run on sustained failure
//! - The worker pool and the manager that owns its lifecycle

mod breaker;
mod fetcher;
mod manager;
mod retry;
mod worker;

pub use breaker::FailureBreaker;
pub use fetcher::{build_http_client, download_to_file, target_path, DownloadedFile, FetchError};
pub use manager::DownloadManager;
pub use retry::{RetryDecision, RetryPolicy};
