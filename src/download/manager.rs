//! Download manager - lifecycle and orchestration of the download pipeline
//!
//! The manager is the only public entry point. It owns:
//! - The URL state table and work queue (deduplicated pending work)
//! - The worker pool for one `start`/`stop` run
//! - The failure breaker and retry policy shared by the workers
//! - The queue snapshot written on stop, abort, and dispose
//!
//! Two cancellation scopes are used. The master token lives as long as the
//! manager and is cancelled only by `dispose`. Each run gets a processing
//! token, a child of the master; `stop` and the failure breaker cancel only
//! the processing token, so a later `start` can begin a fresh run.

use crate::config::Config;
use crate::download::breaker::FailureBreaker;
use crate::download::fetcher::build_http_client;
use crate::download::retry::RetryPolicy;
use crate::download::worker::run_worker;
use crate::events::{DownloadEvent, EventSink, FinishReason};
use crate::output::{DownloadStatistics, DownloadStats};
use crate::queue::{PersistError, QueueStore, WorkQueue};
use crate::state::{ModuleState, UrlState, UrlStateTable};
use crate::url::normalize_url;
use crate::{ReelError, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// State shared between the manager, its workers, and the run supervisor
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) client: Client,
    pub(crate) table: UrlStateTable,
    pub(crate) queue: WorkQueue,
    pub(crate) breaker: FailureBreaker,
    pub(crate) policy: RetryPolicy,
    pub(crate) events: EventSink,
    pub(crate) stats: DownloadStats,
    store: QueueStore,
    state: watch::Sender<ModuleState>,
    master: CancellationToken,
    disposed: AtomicBool,
    /// Set when the breaker aborted the current run
    aborted: AtomicBool,
}

impl Shared {
    fn state(&self) -> ModuleState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ModuleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("Download manager {} -> {}", previous, state);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Validates, deduplicates, and queues a URL
    fn enqueue(&self, url: &str) -> bool {
        if self.is_disposed() || self.master.is_cancelled() || !self.state().accepts_urls() {
            tracing::debug!("Refusing {} while shutting down", url);
            self.stats.record_rejected();
            return false;
        }

        let normalized = match normalize_url(url) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::debug!("Rejected URL '{}': {}", url, e);
                self.stats.record_rejected();
                return false;
            }
        };
        let key = normalized.as_str();

        if !self.table.try_insert(key) {
            tracing::debug!("Skipping duplicate URL {}", key);
            self.stats.record_rejected();
            return false;
        }

        if !self.queue.push(key.to_string()) {
            self.table.remove(key);
            tracing::debug!("Queue closed for adding; rejected {}", key);
            self.stats.record_rejected();
            return false;
        }

        self.stats.record_enqueued();
        self.events.emit(DownloadEvent::Enqueued {
            url: key.to_string(),
            queued: self.queue.len(),
        });
        true
    }

    /// Writes the untaken queue to the snapshot file on the blocking pool
    ///
    /// An empty queue leaves any existing snapshot untouched. Errors are logged.
    async fn persist(&self) {
        let pending = self.queue.snapshot();
        if pending.is_empty() {
            tracing::debug!("Queue empty; leaving snapshot file untouched");
            return;
        }

        let store = self.store.clone();
        let count = pending.len();
        match tokio::task::spawn_blocking(move || store.save(&pending)).await {
            Ok(result) => self.log_save(result, count),
            Err(e) => tracing::error!("Snapshot task failed: {}", e),
        }
    }

    /// Synchronous save for `Drop`, where no runtime can be awaited
    fn persist_now(&self) {
        let pending = self.queue.snapshot();
        if pending.is_empty() {
            return;
        }
        self.log_save(self.store.save(&pending), pending.len());
    }

    fn log_save(&self, result: std::result::Result<(), PersistError>, count: usize) {
        match result {
            Ok(()) => tracing::info!(
                "Saved {} pending URLs to {}",
                count,
                self.store.path().display()
            ),
            Err(e) => tracing::warn!("Failed to save pending URLs: {}", e),
        }
    }

    /// Called by the worker whose failure tripped the breaker
    pub(crate) fn abort_processing(&self, processing: &CancellationToken) {
        if processing.is_cancelled() {
            return;
        }

        let failures = self.breaker.consecutive_failures();
        self.aborted.store(true, Ordering::SeqCst);
        self.stats.record_abort();
        tracing::warn!(
            "{} consecutive download failures; aborting current run",
            failures
        );
        self.events.emit(DownloadEvent::Aborted {
            consecutive_failures: failures,
        });

        self.state.send_if_modified(|state| {
            if *state == ModuleState::Running {
                *state = ModuleState::Stopping;
                true
            } else {
                false
            }
        });
        processing.cancel();
    }
}

/// Waits for a run's workers, then performs the shutdown sequence
async fn supervise(shared: Arc<Shared>, mut workers: JoinSet<()>, processing: CancellationToken) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Download worker failed: {}", e);
        }
    }

    shared.set_state(ModuleState::Stopping);

    let reason = if shared.aborted.load(Ordering::SeqCst) {
        FinishReason::Aborted
    } else if processing.is_cancelled() {
        FinishReason::Stopped
    } else {
        FinishReason::Drained
    };

    shared.persist().await;

    let pending = shared.queue.len();
    tracing::info!("Download run finished: {} ({} pending)", reason, pending);
    shared
        .events
        .emit(DownloadEvent::Finished { reason, pending });

    shared.set_state(ModuleState::Stopped);
}

/// Handles for the run in progress
#[derive(Default)]
struct RunHandle {
    processing: Option<CancellationToken>,
    supervisor: Option<JoinHandle<()>>,
}

/// Download queue manager
///
/// # Example
///
/// ```no_run
/// use reel_queue::config::load_config;
/// use reel_queue::DownloadManager;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let manager = DownloadManager::new(config)?;
///
/// manager.enqueue_url("https://cdn.example.com/videos/clip.mp4");
/// manager.complete_adding();
/// manager.start().await?;
/// manager.wait().await;
/// manager.dispose().await;
/// # Ok(())
/// # }
/// ```
pub struct DownloadManager {
    shared: Arc<Shared>,
    run: Mutex<RunHandle>,
}

impl DownloadManager {
    /// Creates a manager and restores any saved queue
    ///
    /// # Returns
    ///
    /// * `Ok(DownloadManager)` - Ready to accept URLs; not yet started
    /// * `Err(ReelError)` - Invalid configuration or HTTP client setup failure
    pub fn new(config: Config) -> Result<Self> {
        crate::config::validate(&config)?;
        let client = build_http_client(&config)?;
        let (state, _) = watch::channel(ModuleState::Stopped);

        let shared = Arc::new(Shared {
            client,
            table: UrlStateTable::new(),
            queue: WorkQueue::new(),
            breaker: FailureBreaker::new(config.downloader.max_consecutive_failures),
            policy: RetryPolicy::from_config(&config.downloader),
            events: EventSink::new(),
            stats: DownloadStats::new(),
            store: QueueStore::new(&config.persistence.queue_file),
            state,
            master: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            config,
        });

        let manager = Self {
            shared,
            run: Mutex::new(RunHandle::default()),
        };
        manager.restore_saved_queue();
        Ok(manager)
    }

    /// Feeds the saved snapshot through the normal enqueue path
    fn restore_saved_queue(&self) {
        let store = &self.shared.store;
        let saved = match store.load() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(
                    "Could not load saved queue from {} ({}); starting empty",
                    store.path().display(),
                    e
                );
                return;
            }
        };

        if saved.is_empty() {
            return;
        }

        let restored = saved.iter().filter(|url| self.shared.enqueue(url)).count();
        self.shared.stats.record_restored(restored as u64);
        tracing::info!(
            "Restored {} saved URLs from {} ({} skipped)",
            restored,
            store.path().display(),
            saved.len() - restored
        );
    }

    /// Queues a URL for download
    ///
    /// Returns false without side effects when the URL is empty or malformed,
    /// already queued or in flight, the queue was closed with
    /// [`complete_adding`](Self::complete_adding), or the manager is stopping
    /// or disposed.
    pub fn enqueue_url(&self, url: &str) -> bool {
        self.shared.enqueue(url)
    }

    /// Closes the queue for adding; workers exit once it drains
    pub fn complete_adding(&self) {
        if !self.shared.queue.is_closed() {
            self.shared.queue.close();
            tracing::info!(
                "Queue closed for adding ({} pending)",
                self.shared.queue.len()
            );
        }
    }

    /// Starts the worker pool
    ///
    /// No-op if already running or disposed. Fails if the download directory
    /// cannot be created.
    pub async fn start(&self) -> Result<()> {
        let mut run = self.run.lock().await;

        if self.shared.is_disposed() {
            tracing::debug!("Ignoring start on disposed download manager");
            return Ok(());
        }
        if self.shared.state() == ModuleState::Running {
            return Ok(());
        }

        // A previous run may still be finishing after an abort
        if let Some(supervisor) = run.supervisor.take() {
            if let Err(e) = supervisor.await {
                tracing::error!("Previous download run failed: {}", e);
            }
        }

        let dir = &self.shared.config.downloader.download_directory;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ReelError::DownloadDirectory {
                path: dir.clone(),
                source,
            })?;

        self.shared.breaker.reset();
        self.shared.aborted.store(false, Ordering::SeqCst);

        let processing = self.shared.master.child_token();
        let worker_count = self.shared.config.downloader.max_concurrency as usize;
        let queued = self.shared.queue.len();

        self.shared.set_state(ModuleState::Running);
        tracing::info!(
            "Starting {} download workers ({} URLs queued) into {}",
            worker_count,
            queued,
            dir.display()
        );
        self.shared.events.emit(DownloadEvent::Started {
            workers: worker_count,
            queued,
        });

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(run_worker(
                id,
                Arc::clone(&self.shared),
                processing.clone(),
            ));
        }

        run.supervisor = Some(tokio::spawn(supervise(
            Arc::clone(&self.shared),
            workers,
            processing.clone(),
        )));
        run.processing = Some(processing);

        Ok(())
    }

    /// Stops the current run and saves the untaken queue
    ///
    /// Idempotent; when nothing is running this only saves.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        if self.shared.is_disposed() {
            return;
        }
        self.stop_run(&mut run).await;
    }

    async fn stop_run(&self, run: &mut RunHandle) {
        if let Some(processing) = run.processing.take() {
            self.shared.state.send_if_modified(|state| {
                if *state == ModuleState::Running {
                    *state = ModuleState::Stopping;
                    true
                } else {
                    false
                }
            });
            processing.cancel();
        }

        if let Some(supervisor) = run.supervisor.take() {
            if let Err(e) = supervisor.await {
                tracing::error!("Download run failed during stop: {}", e);
            }
        }

        self.shared.persist().await;
        self.shared.set_state(ModuleState::Stopped);
    }

    /// Shuts the manager down for good
    ///
    /// Stops any run, cancels all outstanding work, saves the queue one final
    /// time, and closes the queue. Afterwards URLs are refused and `start`/`stop`
    /// do nothing.
    pub async fn dispose(&self) {
        let mut run = self.run.lock().await;
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop_run(&mut run).await;
        self.shared.master.cancel();
        self.shared.queue.close();
        self.shared.persist().await;
        tracing::info!("Download manager disposed");
    }

    /// Resolves once the manager is stopped (immediately if it never started)
    pub async fn wait(&self) {
        let mut rx = self.shared.state.subscribe();
        // The sender lives in `shared`, which outlives this borrow
        let _ = rx.wait_for(|state| *state == ModuleState::Stopped).await;
    }

    pub fn state(&self) -> ModuleState {
        self.shared.state()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Subscribes to status notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.shared.events.subscribe()
    }

    /// URLs waiting in the queue, in take order
    pub fn pending(&self) -> Vec<String> {
        self.shared.queue.snapshot()
    }

    /// Where the URL (after normalization) currently is, if it is tracked
    pub fn url_state(&self, url: &str) -> Option<UrlState> {
        let normalized = normalize_url(url).ok()?;
        self.shared.table.get(normalized.as_str())
    }

    /// Returns true if the URL (after normalization) is queued or in flight
    pub fn is_tracked(&self, url: &str) -> bool {
        self.url_state(url).is_some()
    }

    pub fn stats(&self) -> DownloadStatistics {
        self.shared
            .stats
            .snapshot(self.shared.queue.len(), self.shared.table.in_flight())
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if !self.shared.is_disposed() {
            self.shared.master.cancel();
            self.shared.persist_now();
        }
    }
}
