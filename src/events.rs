//! Status notifications for hosts (GUI, CLI) that display download progress
//!
//! Events are published on a `tokio::sync::broadcast` channel. Publishing never
//! blocks and is a no-op when nobody is subscribed; slow subscribers lag and
//! lose the oldest events rather than holding up workers.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why a download run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// `stop` or `dispose` was called
    Stopped,
    /// The queue was closed for adding and every URL was taken
    Drained,
    /// The failure breaker tripped
    Aborted,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Drained => "queue drained",
            Self::Aborted => "aborted after repeated failures",
        })
    }
}

/// A status notification from the download manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Enqueued {
        url: String,
        queued: usize,
    },
    Started {
        workers: usize,
        queued: usize,
    },
    Retrying {
        url: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Downloaded {
        url: String,
        path: PathBuf,
        bytes: u64,
    },
    Failed {
        url: String,
        error: String,
    },
    Aborted {
        consecutive_failures: u32,
    },
    Finished {
        reason: FinishReason,
        pending: usize,
    },
}

impl fmt::Display for DownloadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enqueued { url, queued } => write!(f, "Queued {} ({} pending)", url, queued),
            Self::Started { workers, queued } => write!(
                f,
                "Started {} download workers ({} pending)",
                workers, queued
            ),
            Self::Retrying {
                url,
                attempt,
                delay,
                error,
            } => write!(
                f,
                "Retrying {} (attempt {}) in {:.1}s: {}",
                url,
                attempt,
                delay.as_secs_f64(),
                error
            ),
            Self::Downloaded { url, path, bytes } => write!(
                f,
                "Downloaded {} -> {} ({} bytes)",
                url,
                path.display(),
                bytes
            ),
            Self::Failed { url, error } => write!(f, "Failed {}: {}", url, error),
            Self::Aborted {
                consecutive_failures,
            } => write!(
                f,
                "Aborting downloads after {} consecutive failures",
                consecutive_failures
            ),
            Self::Finished { reason, pending } => {
                write!(f, "Downloads finished: {} ({} pending)", reason, pending)
            }
        }
    }
}

/// Sending half of the status channel, shared by the manager and its workers
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<DownloadEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event. No-op if no subscribers.
    pub fn emit(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
