//! Download Engine - Main coordinator
//!
//! The `DownloadEngine` is the primary entry point for the library. Each call
//! to [`DownloadEngine::start`] creates an independent job with its own
//! control signal, progress aggregator and output file; nothing mutable is
//! shared between jobs. The job's controller task probes the server, plans
//! segments, drives the workers and publishes the final outcome, which the
//! caller observes through a [`DownloadHandle`].

use crate::config::EngineConfig;
use crate::control::{ControlSignal, ControlState};
use crate::error::{EngineError, Result, StorageErrorKind};
use crate::http::{
    extract_filename_from_url, plan_segments, probe_server, ConnectionPool, SegmentWorker,
    WorkerContext, WorkerExit,
};
use crate::output::OutputFile;
use crate::progress::ProgressAggregator;
use crate::types::{
    DownloadEvent, DownloadId, DownloadJob, DownloadOutcome, JobState, ProgressSnapshot,
};

use chrono::Utc;
use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use url::Url;

/// Maximum number of events to buffer
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// File name used when neither the destination nor the URL provides one
const FALLBACK_FILENAME: &str = "download";

/// The main download engine
pub struct DownloadEngine {
    /// Configuration
    config: Arc<EngineConfig>,

    /// HTTP client shared by all jobs
    pool: Arc<ConnectionPool>,

    /// Event broadcaster
    event_tx: broadcast::Sender<DownloadEvent>,

    /// Jobs that have not reached a terminal state
    jobs: Arc<RwLock<HashMap<DownloadId, DownloadHandle>>>,
}

impl DownloadEngine {
    /// Create a new download engine with the given configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(&config)?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            pool: Arc::new(pool),
            event_tx,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to events from every job of this engine
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.event_tx.subscribe()
    }

    /// Bytes downloaded by all jobs of this engine
    pub fn total_downloaded(&self) -> u64 {
        self.pool.total_downloaded()
    }

    /// Open HTTP transfers across all jobs of this engine
    pub fn active_connections(&self) -> u64 {
        self.pool.active_connections()
    }

    /// Look up a job that is still running.
    ///
    /// Jobs leave the registry once they reach a terminal state; callers keep
    /// their own [`DownloadHandle`] to read the outcome.
    pub fn handle(&self, id: DownloadId) -> Option<DownloadHandle> {
        self.jobs.read().get(&id).cloned()
    }

    /// All jobs that are still running
    pub fn list(&self) -> Vec<DownloadJob> {
        self.jobs.read().values().map(|h| h.job()).collect()
    }

    /// Start a job using the configured default segment count
    pub async fn start_default(&self, url: &str, dest: impl AsRef<Path>) -> Result<DownloadHandle> {
        self.start(url, dest, self.config.default_segments).await
    }

    /// Start downloading `url` into `dest` with up to `segment_count` segments.
    ///
    /// `dest` may be a file path or an existing directory; for a directory the
    /// file name comes from the URL. The destination is created (truncated)
    /// before this returns, so an unwritable path fails here with
    /// [`EngineError::InvalidInput`] and no network I/O takes place.
    pub async fn start(
        &self,
        url: &str,
        dest: impl AsRef<Path>,
        segment_count: usize,
    ) -> Result<DownloadHandle> {
        let url = validate_url(url)?;

        if segment_count == 0 {
            return Err(EngineError::invalid_input(
                "segment_count",
                "Must be at least 1",
            ));
        }
        let segment_count = if segment_count > self.config.max_segments {
            tracing::debug!(
                "Clamping segment count {} to {}",
                segment_count,
                self.config.max_segments
            );
            self.config.max_segments
        } else {
            segment_count
        };

        let dest_path = resolve_destination(dest.as_ref(), url.as_str())?;
        let output = OutputFile::create(&dest_path).await.map_err(|e| {
            EngineError::invalid_input(
                "dest_path",
                format!("{} is not writable: {}", dest_path.display(), e),
            )
        })?;

        let job = DownloadJob {
            id: DownloadId::new(),
            url: url.to_string(),
            dest_path,
            segment_count,
            total_size: 0,
            created_at: Utc::now(),
        };
        let id = job.id;

        let (state_tx, _) = watch::channel(JobState::Idle);
        let (outcome_tx, _) = watch::channel(None);
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());

        let shared = Arc::new(JobShared {
            id,
            job: RwLock::new(job),
            state: state_tx,
            control: ControlSignal::new(),
            outcome: outcome_tx,
            active_workers: AtomicUsize::new(0),
            event_tx: self.event_tx.clone(),
        });

        tracing::info!("Starting download {} from {}", id, url);
        let _ = self.event_tx.send(DownloadEvent::Started { id });

        let controller = JobController {
            shared: Arc::clone(&shared),
            pool: Arc::clone(&self.pool),
            config: Arc::clone(&self.config),
            output,
            progress_tx,
        };
        let handle = DownloadHandle {
            shared: Arc::clone(&shared),
            progress_rx,
        };
        // Registered before the controller runs so removal never precedes insertion
        self.jobs.write().insert(id, handle.clone());

        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let outcome = match tokio::spawn(controller.run()).await {
                Ok(outcome) => outcome,
                Err(e) => DownloadOutcome::Failed {
                    reason: EngineError::Internal(format!("Controller task failed: {}", e)),
                },
            };
            jobs.write().remove(&id);
            shared.finish(outcome);
        });

        Ok(handle)
    }

    /// Stop every running job and wait for all of them to finish
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.jobs.read().values().cloned().collect();
        for handle in handles {
            if !handle.state().is_terminal() {
                handle.stop().await;
            }
        }
    }
}

/// Caller-side handle to one job.
///
/// Cloning is cheap; all clones control the same job.
#[derive(Clone)]
pub struct DownloadHandle {
    shared: Arc<JobShared>,
    progress_rx: watch::Receiver<ProgressSnapshot>,
}

impl std::fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl DownloadHandle {
    /// Job identifier
    pub fn id(&self) -> DownloadId {
        self.shared.id
    }

    /// Copy of the job description (total size is filled in after the probe)
    pub fn job(&self) -> DownloadJob {
        self.shared.job.read().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        *self.shared.state.borrow()
    }

    /// Latest published progress snapshot
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress_rx.borrow().clone()
    }

    /// Number of segment workers still alive
    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::SeqCst)
    }

    /// Suspend all workers at their next chunk boundary. No-op when terminal.
    pub fn pause(&self) {
        if self.state().is_terminal() {
            return;
        }
        if self.shared.control.pause() {
            tracing::debug!("Pausing download {}", self.shared.id);
            self.shared.sync_with_control();
            let _ = self
                .shared
                .event_tx
                .send(DownloadEvent::Paused { id: self.shared.id });
        }
    }

    /// Let paused workers continue. No-op when terminal.
    pub fn resume(&self) {
        if self.state().is_terminal() {
            return;
        }
        if self.shared.control.resume() {
            tracing::debug!("Resuming download {}", self.shared.id);
            self.shared.sync_with_control();
            let _ = self
                .shared
                .event_tx
                .send(DownloadEvent::Resumed { id: self.shared.id });
        }
    }

    /// Request cancellation and wait until every worker has exited.
    ///
    /// Returns the job's final outcome: `Stopped` if the stop took effect,
    /// or whatever the job had already finished with.
    pub async fn stop(&self) -> DownloadOutcome {
        if !self.state().is_terminal() && self.shared.control.stop() {
            tracing::debug!("Stopping download {}", self.shared.id);
            self.shared
                .transition(|s| !s.is_terminal(), JobState::Stopping);
        }
        self.wait().await
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(&self) -> DownloadOutcome {
        let mut rx = self.shared.outcome.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| DownloadOutcome::Failed {
            reason: EngineError::Internal("Job ended without an outcome".to_string()),
        })
    }

    /// Progress updates for this job.
    ///
    /// Yields the current snapshot immediately, then every newly published
    /// one, and ends after the final snapshot. Slow consumers skip
    /// intermediate values instead of holding up the workers.
    pub fn subscribe(&self) -> impl Stream<Item = ProgressSnapshot> + Send + 'static {
        let rx = self.progress_rx.clone();
        futures::stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = rx.borrow_and_update().clone();
            Some((snapshot, (rx, false)))
        })
    }
}

/// Per-job context shared between the handle and the controller
struct JobShared {
    id: DownloadId,
    job: RwLock<DownloadJob>,
    state: watch::Sender<JobState>,
    control: ControlSignal,
    outcome: watch::Sender<Option<DownloadOutcome>>,
    active_workers: AtomicUsize,
    event_tx: broadcast::Sender<DownloadEvent>,
}

impl JobShared {
    /// Move to `new_state` if the current state satisfies `allowed`
    fn transition(&self, allowed: impl Fn(JobState) -> bool, new_state: JobState) -> bool {
        self.update_state(|state| allowed(state).then_some(new_state))
    }

    /// Derive Downloading/Paused from the control signal.
    ///
    /// The control state is read while the job state is locked, so whichever
    /// of a racing pause and resume syncs last sees the final signal.
    fn sync_with_control(&self) -> bool {
        self.update_state(|state| match (state, self.control.state()) {
            (JobState::Downloading, ControlState::Paused) => Some(JobState::Paused),
            (JobState::Paused, ControlState::Running) => Some(JobState::Downloading),
            _ => None,
        })
    }

    /// Leave Probing; a pause that arrived meanwhile takes effect before any worker runs
    fn begin_transfer(&self) -> bool {
        self.update_state(|state| {
            (state == JobState::Probing).then(|| match self.control.state() {
                ControlState::Paused => JobState::Paused,
                _ => JobState::Downloading,
            })
        })
    }

    /// Apply `next` to the current state atomically and emit `StateChanged`
    fn update_state(&self, next: impl FnOnce(JobState) -> Option<JobState>) -> bool {
        let mut changed = None;
        self.state.send_if_modified(|state| match next(*state) {
            Some(new_state) if new_state != *state => {
                changed = Some((*state, new_state));
                *state = new_state;
                true
            }
            _ => false,
        });

        match changed {
            Some((old_state, new_state)) => {
                tracing::debug!("Download {}: {} -> {}", self.id, old_state, new_state);
                let _ = self.event_tx.send(DownloadEvent::StateChanged {
                    id: self.id,
                    old_state,
                    new_state,
                });
                true
            }
            None => false,
        }
    }

    /// Record the terminal outcome and wake every waiter
    fn finish(&self, outcome: DownloadOutcome) {
        let id = self.id;
        match &outcome {
            DownloadOutcome::Completed => {
                self.transition(|s| !s.is_terminal(), JobState::Completed);
                tracing::info!("Download {} completed", id);
                let _ = self.event_tx.send(DownloadEvent::Completed { id });
            }
            DownloadOutcome::Stopped => {
                self.transition(|s| !s.is_terminal(), JobState::Completed);
                tracing::info!("Download {} stopped", id);
                let _ = self.event_tx.send(DownloadEvent::Stopped { id });
            }
            DownloadOutcome::Failed { reason } => {
                self.transition(|s| !s.is_terminal(), JobState::Failed);
                tracing::error!("Download {} failed: {}", id, reason);
                let _ = self.event_tx.send(DownloadEvent::Failed {
                    id,
                    error: reason.to_string(),
                    segment: reason.segment_index(),
                });
            }
        }
        self.outcome.send_replace(Some(outcome));
    }
}

/// Decrements the live worker count when a worker task ends
struct WorkerGuard(Arc<JobShared>);

impl WorkerGuard {
    fn new(shared: Arc<JobShared>) -> Self {
        shared.active_workers.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives one job from probe to terminal outcome
struct JobController {
    shared: Arc<JobShared>,
    pool: Arc<ConnectionPool>,
    config: Arc<EngineConfig>,
    output: OutputFile,
    progress_tx: watch::Sender<ProgressSnapshot>,
}

impl JobController {
    async fn run(self) -> DownloadOutcome {
        let shared = Arc::clone(&self.shared);
        let (url, segment_count) = {
            let job = shared.job.read();
            (job.url.clone(), job.segment_count)
        };

        shared.transition(|s| s == JobState::Idle, JobState::Probing);

        let mut control = shared.control.subscribe();
        let probed = tokio::select! {
            probed = probe_server(self.pool.client(), &url, self.pool.user_agent()) => probed,
            _ = control.stopped() => return DownloadOutcome::Stopped,
        };
        let capabilities = match probed {
            Ok(capabilities) => capabilities,
            Err(reason) => return DownloadOutcome::Failed { reason },
        };

        let total_size = capabilities.total_size();
        shared.job.write().total_size = total_size;

        let requested = if capabilities.supports_range {
            segment_count
        } else {
            if segment_count > 1 {
                tracing::debug!(
                    "Download {}: server does not accept ranges, using one segment",
                    shared.id
                );
            }
            1
        };
        let segments = plan_segments(total_size, requested);

        if total_size > 0 {
            if let Err(reason) = self.output.preallocate(total_size).await {
                return DownloadOutcome::Failed { reason };
            }
        }

        let progress = Arc::new(ProgressAggregator::new(total_size, segments.len()));
        self.progress_tx.send_replace(progress.snapshot(0));

        shared.begin_transfer();

        tracing::debug!(
            "Download {}: {} bytes in {} segment(s)",
            shared.id,
            total_size,
            segments.len()
        );

        let ctx = WorkerContext {
            pool: Arc::clone(&self.pool),
            url,
            output: self.output.clone(),
            progress: Arc::clone(&progress),
            chunk_size: self.config.chunk_size,
            ranged: segments.len() > 1,
        };

        let mut workers = JoinSet::new();
        for segment in segments {
            let guard = WorkerGuard::new(Arc::clone(&shared));
            let worker = SegmentWorker::new(ctx.clone(), segment, shared.control.subscribe());
            workers.spawn(async move {
                let _guard = guard;
                worker.run().await
            });
        }
        drop(ctx);

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.progress_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut first_error: Option<EngineError> = None;
        let mut cancelled = false;

        loop {
            tokio::select! {
                joined = workers.join_next() => {
                    let result = match joined {
                        None => break,
                        Some(Ok(result)) => result,
                        Some(Err(e)) => Err(EngineError::Internal(format!("Segment task panicked: {}", e))),
                    };
                    match result {
                        Ok(WorkerExit::Completed) => {}
                        Ok(WorkerExit::Cancelled) => cancelled = true,
                        Err(e) => {
                            tracing::warn!("Download {}: {}", shared.id, e);
                            if first_error.is_none() {
                                // A missing range makes the file unusable; stop the rest
                                shared.control.stop();
                                first_error = Some(e);
                            }
                        }
                    }
                }
                _ = ticker.tick() => self.publish(&progress),
            }
        }

        self.publish(&progress);

        if let Some(reason) = first_error {
            return DownloadOutcome::Failed { reason };
        }
        if cancelled {
            return DownloadOutcome::Stopped;
        }

        if let Err(e) = self.output.sync().await {
            return DownloadOutcome::Failed {
                reason: EngineError::storage(
                    StorageErrorKind::Io,
                    self.output.path(),
                    e.to_string(),
                ),
            };
        }
        DownloadOutcome::Completed
    }

    fn publish(&self, progress: &ProgressAggregator) {
        let snapshot = progress.snapshot(self.shared.active_workers.load(Ordering::SeqCst));
        self.progress_tx.send_replace(snapshot.clone());
        let _ = self.shared.event_tx.send(DownloadEvent::Progress {
            id: self.shared.id,
            progress: snapshot,
        });
    }
}

/// Reject empty, unparseable and non-HTTP URLs
fn validate_url(url: &str) -> Result<Url> {
    let url = url.trim();
    if url.is_empty() {
        return Err(EngineError::invalid_input("url", "URL is empty"));
    }
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(EngineError::invalid_input(
            "url",
            format!("Unsupported scheme: {}", scheme),
        )),
    }
}

/// Turn the caller's destination into a file path
fn resolve_destination(dest: &Path, url: &str) -> Result<PathBuf> {
    if dest.as_os_str().is_empty() {
        return Err(EngineError::invalid_input(
            "dest_path",
            "Destination is empty",
        ));
    }
    if !dest.is_dir() {
        return Ok(dest.to_path_buf());
    }

    let filename =
        extract_filename_from_url(url).unwrap_or_else(|| FALLBACK_FILENAME.to_string());

    // Validate filename for path traversal attacks
    for component in Path::new(&filename).components() {
        match component {
            Component::ParentDir => {
                return Err(EngineError::invalid_input(
                    "dest_path",
                    "Invalid filename: contains parent directory reference (..)",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(EngineError::invalid_input(
                    "dest_path",
                    "Invalid filename: contains absolute path",
                ));
            }
            _ => {}
        }
    }

    Ok(dest.join(filename))
}
