//! Download worker loop
//!
//! Each worker repeatedly:
//! 1. Takes a URL from the work queue (exits on cancellation or a drained, closed queue)
//! 2. Downloads it, retrying transient failures per the retry policy
//! 3. Reports the outcome to the failure breaker and the status channel
//!
//! Cancellation is checked before every take and raced against both the
//! network transfer and the retry sleep, so a stop never waits out a download.

use crate::download::fetcher::{
    discard_partial, download_to_file, partial_path, target_path, DownloadedFile, FetchError,
};
use crate::download::manager::Shared;
use crate::download::retry::RetryDecision;
use crate::events::DownloadEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of processing one URL
#[derive(Debug)]
enum Outcome {
    Downloaded(DownloadedFile),
    Failed(FetchError),
    /// The processing scope was cancelled mid-download
    Cancelled,
}

pub(crate) async fn run_worker(id: usize, shared: Arc<Shared>, processing: CancellationToken) {
    tracing::debug!("Worker {} started", id);

    while !processing.is_cancelled() {
        let Some(url) = shared.queue.take(&processing).await else {
            break;
        };
        shared.table.mark_in_flight(&url);
        tracing::debug!("Worker {} downloading {}", id, url);

        match process_url(id, &shared, &url, &processing).await {
            Outcome::Downloaded(file) => {
                shared.table.remove(&url);
                shared.stats.record_downloaded(file.bytes);
                shared.breaker.record(true);
                tracing::info!(
                    "Downloaded {} to {} ({} bytes)",
                    url,
                    file.path.display(),
                    file.bytes
                );
                shared.events.emit(DownloadEvent::Downloaded {
                    url,
                    path: file.path,
                    bytes: file.bytes,
                });
            }

            Outcome::Failed(error) => {
                shared.table.remove(&url);
                shared.stats.record_failed();
                tracing::warn!("Giving up on {}: {}", url, error);
                shared.events.emit(DownloadEvent::Failed {
                    url,
                    error: error.to_string(),
                });

                if shared.breaker.record(false) {
                    shared.abort_processing(&processing);
                }
            }

            Outcome::Cancelled => {
                // Taken URLs are not part of the queue snapshot; this one is dropped.
                shared.table.remove(&url);
                tracing::warn!("Download of {} interrupted; URL will not be resumed", url);
                break;
            }
        }
    }

    tracing::debug!("Worker {} exiting", id);
}

/// Downloads one URL through the retry policy
async fn process_url(
    worker: usize,
    shared: &Shared,
    url: &str,
    cancel: &CancellationToken,
) -> Outcome {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => return Outcome::Failed(FetchError::InvalidUrl(e.to_string())),
    };
    let dir = &shared.config.downloader.download_directory;

    let mut attempt = 0u32;
    loop {
        let result = {
            let _active = shared.stats.begin_fetch();
            tokio::select! {
                _ = cancel.cancelled() => None,
                result = download_to_file(&shared.client, &parsed, dir, worker) => Some(result),
            }
        };

        let error = match result {
            Some(Ok(file)) => return Outcome::Downloaded(file),
            Some(Err(error)) => error,
            None => {
                // Leaves any file at the final path alone
                discard_partial(&partial_path(&target_path(dir, &parsed), worker)).await;
                return Outcome::Cancelled;
            }
        };

        let delay = match shared.policy.decide(&error, attempt) {
            RetryDecision::GiveUp => return Outcome::Failed(error),
            RetryDecision::Retry(delay) => delay,
        };

        attempt += 1;
        shared.stats.record_retry();
        tracing::debug!(
            "Attempt {} for {} failed ({}); retrying in {:?}",
            attempt,
            url,
            error,
            delay
        );
        shared.events.emit(DownloadEvent::Retrying {
            url: url.to_string(),
            attempt,
            delay,
            error: error.to_string(),
        });

        tokio::select! {
            _ = cancel.cancelled() => return Outcome::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
