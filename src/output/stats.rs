//! Download statistics
//!
//! Counters are updated lock-free by the workers and read as a consistent-enough
//! snapshot for progress displays.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters shared by the manager and its workers
#[derive(Debug)]
pub struct DownloadStats {
    created_at: DateTime<Utc>,
    enqueued: AtomicU64,
    rejected: AtomicU64,
    restored: AtomicU64,
    downloaded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    aborts: AtomicU64,
    bytes_written: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Default for DownloadStats {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            enqueued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            restored: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }
}

impl DownloadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restored(&self, count: u64) {
        self.restored.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks a fetch as started and returns a guard that ends it on drop
    pub fn begin_fetch(&self) -> ActiveFetch<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        ActiveFetch { stats: self }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous fetches observed
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    /// Builds a snapshot; queue figures come from the caller
    pub fn snapshot(&self, queued: usize, in_flight: usize) -> DownloadStatistics {
        DownloadStatistics {
            created_at: self.created_at,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            active: self.active(),
            peak_active: self.peak_active(),
            queued,
            in_flight,
        }
    }
}

/// Decrements the active fetch gauge when dropped
#[derive(Debug)]
pub struct ActiveFetch<'a> {
    stats: &'a DownloadStats,
}

impl Drop for ActiveFetch<'_> {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time copy of the download counters
#[derive(Debug, Clone, Serialize)]
pub struct DownloadStatistics {
    pub created_at: DateTime<Utc>,

    /// URLs accepted by enqueue (including restored ones)
    pub enqueued: u64,

    /// URLs refused as malformed, duplicate, or during shutdown
    pub rejected: u64,

    /// URLs accepted from the saved queue at startup
    pub restored: u64,

    pub downloaded: u64,

    /// URLs given up on after a permanent error or exhausted retries
    pub failed: u64,

    pub retries: u64,

    /// Number of times the failure breaker aborted a run
    pub aborts: u64,

    pub bytes_written: u64,

    pub active: usize,

    pub peak_active: usize,

    /// URLs waiting in the queue
    pub queued: usize,

    /// URLs taken by workers
    pub in_flight: usize,
}

/// Prints statistics to stdout in a formatted way
pub fn print_statistics(stats: &DownloadStatistics) {
    println!("=== Download Statistics ===\n");

    println!("Since: {}", stats.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Enqueued: {} ({} restored)", stats.enqueued, stats.restored);
    println!("Rejected: {}", stats.rejected);
    println!("Downloaded: {}", stats.downloaded);
    println!("Failed: {}", stats.failed);
    println!("Retries: {}", stats.retries);
    println!("Aborted runs: {}", stats.aborts);
    println!("Bytes written: {}", format_bytes(stats.bytes_written));
    println!("Peak concurrent downloads: {}", stats.peak_active);

    println!("\nQueue:");
    println!("  Pending: {}", stats.queued);
    println!("  In flight: {}", stats.in_flight);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
