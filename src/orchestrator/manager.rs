//! The sync manager: worker pool, job state machine, cancellation.
//!
//! Each job is processed end-to-end by exactly one worker. The only state
//! shared between workers is the album consistency cache (inside the
//! placement resolver) and the per-batch counters; both are lock-guarded.
//! Every wait — catalog, transfer, verification sleep, retry backoff — is
//! cancellable against the batch token, and the token is checked again at
//! every state boundary so a cancelled job stops at the next checkpoint.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OrganizerSettings;
use crate::confirm::ConfirmationSource;
use crate::fsops::FileOps;
use crate::naming::ClassificationInput;
use crate::placement::{PlacementResolver, TrackPlacement};
use crate::resolver::MetadataResolver;
use crate::transfer::TransferClient;

use super::batcher::{BatchWindows, EventBatcher};
use super::error::{JobError, JobFailure};
use super::models::{
    BatchCounters, BatchProgress, BatchReport, DownloadJob, JobOutcome, JobState, SyncBatchHandle,
    SyncRequest,
};
use super::retry::RetryPolicy;

/// Per-batch shared state: cancellation scope, counters, batcher inlet.
struct BatchState {
    id: String,
    total: usize,
    cancel: CancellationToken,
    counters: Arc<BatchCounters>,
    outcome_tx: mpsc::UnboundedSender<JobOutcome>,
}

/// One unit of work in the queue.
struct WorkItem {
    job: DownloadJob,
    batch: Arc<BatchState>,
}

/// Orchestrates concurrent download jobs.
pub struct SyncManager {
    resolver: Arc<MetadataResolver>,
    placement: Arc<PlacementResolver>,
    transfer: Arc<dyn TransferClient>,
    fs: Arc<dyn FileOps>,
    confirm: Arc<dyn ConfirmationSource>,
    settings: OrganizerSettings,
    retry: RetryPolicy,
    staging_dir: PathBuf,
    batches: Mutex<HashMap<String, Arc<BatchState>>>,
    job_tx: mpsc::Sender<WorkItem>,
    reports_tx: broadcast::Sender<BatchReport>,
    shutdown: CancellationToken,
}

impl SyncManager {
    /// Create the manager and spawn its worker pool.
    pub fn new(
        resolver: Arc<MetadataResolver>,
        placement: Arc<PlacementResolver>,
        transfer: Arc<dyn TransferClient>,
        fs: Arc<dyn FileOps>,
        confirm: Arc<dyn ConfirmationSource>,
        settings: OrganizerSettings,
        staging_dir: PathBuf,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let retry = RetryPolicy::new(&settings);
        let (job_tx, job_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (reports_tx, _) = broadcast::channel(256);
        let worker_count = settings.worker_count.max(1);

        let manager = Arc::new(Self {
            resolver,
            placement,
            transfer,
            fs,
            confirm,
            settings,
            retry,
            staging_dir,
            batches: Mutex::new(HashMap::new()),
            job_tx,
            reports_tx,
            shutdown,
        });

        let job_rx = Arc::new(Mutex::new(job_rx));
        for idx in 0..worker_count {
            tokio::spawn(run_worker(manager.clone(), job_rx.clone(), idx));
        }
        info!("Sync manager started with {} workers", worker_count);

        manager
    }

    /// Submit a batch of raw results. Jobs share one cancellation scope
    /// and one event-batching window.
    pub async fn submit(&self, request: SyncRequest) -> SyncBatchHandle {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = request.results.len();

        if total == 0 {
            debug!("Empty batch {} submitted, nothing to do", batch_id);
            return SyncBatchHandle { id: batch_id, total };
        }

        let counters = Arc::new(BatchCounters::default());
        let outcome_tx = EventBatcher::spawn(
            batch_id.clone(),
            total,
            BatchWindows {
                failure: std::time::Duration::from_millis(self.settings.failure_flush_ms),
                success: std::time::Duration::from_millis(self.settings.success_flush_ms),
            },
            counters.clone(),
            self.reports_tx.clone(),
        );

        let batch = Arc::new(BatchState {
            id: batch_id.clone(),
            total,
            cancel: self.shutdown.child_token(),
            counters,
            outcome_tx,
        });
        self.batches
            .lock()
            .await
            .insert(batch_id.clone(), batch.clone());

        for (i, raw) in request.results.into_iter().enumerate() {
            let job = DownloadJob::new(
                raw,
                (i + 1) as u32,
                request.forced_album_mode,
                request.forced_album_name.clone(),
            );
            if self
                .job_tx
                .send(WorkItem {
                    job,
                    batch: batch.clone(),
                })
                .await
                .is_err()
            {
                warn!("Job queue closed while submitting batch {}", batch_id);
                break;
            }
        }

        info!("Submitted batch {} with {} jobs", batch_id, total);
        SyncBatchHandle { id: batch_id, total }
    }

    /// Cancel one batch. Its not-yet-terminal jobs stop at the next
    /// state-transition checkpoint; unrelated batches are unaffected.
    pub async fn cancel(&self, batch_id: &str) -> bool {
        match self.batches.lock().await.get(batch_id) {
            Some(batch) => {
                info!("Cancelling batch {}", batch_id);
                batch.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Progress snapshot for one batch.
    pub async fn progress(&self, batch_id: &str) -> Option<BatchProgress> {
        self.batches
            .lock()
            .await
            .get(batch_id)
            .map(|b| b.counters.snapshot(b.total))
    }

    /// Subscribe to batched completion/failure reports.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchReport> {
        self.reports_tx.subscribe()
    }

    /// Number of batches the manager is tracking.
    pub async fn batch_count(&self) -> usize {
        self.batches.lock().await.len()
    }

    /// Drive one job to a terminal state and hand its outcome to the
    /// batcher.
    async fn process_job(&self, item: WorkItem) {
        let WorkItem { mut job, batch } = item;
        batch.counters.start_job();
        job.started_at = Some(chrono::Utc::now().timestamp());

        let outcome = self.drive(&mut job, &batch).await;
        job.completed_at = Some(chrono::Utc::now().timestamp());
        batch.counters.finish_job(outcome.state);

        if batch.outcome_tx.send(outcome).is_err() {
            warn!("Batcher for {} is gone, outcome dropped", batch.id);
        }
    }

    /// The retry loop around one job.
    async fn drive(&self, job: &mut DownloadJob, batch: &BatchState) -> JobOutcome {
        loop {
            match self.run_attempt(job, batch).await {
                Ok(final_path) => {
                    job.advance(JobState::Completed);
                    info!("Job {} completed: {:?}", job.id, final_path);
                    return JobOutcome::completed(job, final_path);
                }
                Err(JobError::Cancelled) => {
                    job.advance(JobState::Cancelled);
                    debug!("Job {} cancelled", job.id);
                    return JobOutcome::cancelled(job);
                }
                Err(e) => {
                    job.last_error = Some(JobFailure::from(&e));

                    if self.retry.should_retry(&e, job.attempts) {
                        let backoff = self.retry.backoff(job.attempts);
                        job.attempts += 1;
                        job.advance(JobState::Failed);
                        job.advance(JobState::Queued);
                        warn!(
                            "Job {} attempt {} failed ({}), retrying in {:?}",
                            job.id, job.attempts, e, backoff
                        );

                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = batch.cancel.cancelled() => {
                                job.advance(JobState::Cancelled);
                                return JobOutcome::cancelled(job);
                            }
                        }
                        continue;
                    }

                    job.advance(JobState::Failed);
                    error!(
                        "Job {} failed terminally after {} attempts: {}",
                        job.id,
                        job.attempts + 1,
                        e
                    );
                    return JobOutcome::failed(job);
                }
            }
        }
    }

    /// One pass through the state machine:
    /// Resolving → Transferring → Verifying → Organizing.
    async fn run_attempt(
        &self,
        job: &mut DownloadJob,
        batch: &BatchState,
    ) -> Result<PathBuf, JobError> {
        self.checkpoint(batch)?;
        job.advance(JobState::Resolving);
        self.resolve_job(job, batch).await?;

        self.checkpoint(batch)?;
        job.advance(JobState::Transferring);
        let staging_path = self.staging_path(job);
        let bytes = self
            .transfer
            .fetch(&job.raw, &staging_path, &batch.cancel)
            .await?;
        debug!("Job {} transferred {} bytes", job.id, bytes);

        self.checkpoint(batch)?;
        job.advance(JobState::Verifying);
        self.verify_stable(&staging_path, job.raw.size_bytes, batch)
            .await?;

        self.checkpoint(batch)?;
        job.advance(JobState::Organizing);
        self.organize(job, &staging_path).await
    }

    /// Cancellation checkpoint at a state boundary.
    fn checkpoint(&self, batch: &BatchState) -> Result<(), JobError> {
        if batch.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        Ok(())
    }

    fn staging_path(&self, job: &DownloadJob) -> PathBuf {
        self.staging_dir.join(format!("{}.part", job.id))
    }

    /// Resolve metadata for the job. Soft failures leave `job.resolved`
    /// empty and the job proceeds with fallback naming; only cancellation
    /// escapes as an error.
    async fn resolve_job(&self, job: &mut DownloadJob, batch: &BatchState) -> Result<(), JobError> {
        if job.resolved.is_some() {
            // A retry re-enters here; the metadata did not go anywhere
            return Ok(());
        }

        // The confirmation collaborator may have an answer ready
        if job.confirmed.is_none() {
            job.confirmed = self.confirm.confirmed_candidate(&job.id, &job.raw).await;
        }

        let candidate = match job.confirmed.clone() {
            Some(confirmed) => Some(confirmed),
            None => {
                let hint = job.album_hint();
                let candidates = tokio::select! {
                    c = self.resolver.resolve(&job.raw, hint.as_ref()) => c,
                    _ = batch.cancel.cancelled() => return Err(JobError::Cancelled),
                };
                let threshold = self.resolver.acceptance_threshold();
                candidates
                    .into_iter()
                    .next()
                    .filter(|c| self.settings.auto_accept && c.score >= threshold)
            }
        };

        match candidate {
            Some(mut candidate) => {
                // Complete the album record when the strategy left it out
                if candidate.album.is_none() {
                    if let Some(album_id) =
                        candidate.track.as_ref().and_then(|t| t.album_id.clone())
                    {
                        let fetched = tokio::select! {
                            a = self.resolver.fetch_album(&album_id) => a,
                            _ = batch.cancel.cancelled() => return Err(JobError::Cancelled),
                        };
                        match fetched {
                            Ok(album) => candidate.album = album,
                            Err(e) => {
                                warn!("Album fetch failed for job {}: {} (continuing)", job.id, e)
                            }
                        }
                    }
                }

                debug!(
                    "Job {} matched {} (score {:.3}, {})",
                    job.id, candidate.artist.name, candidate.score, candidate.reason
                );
                batch.counters.record_matched();
                job.resolved = Some(candidate);
            }
            None => {
                debug!(
                    "Job {} has no confident candidate, will fall back to heuristic naming",
                    job.id
                );
            }
        }

        Ok(())
    }

    /// Wait for the staged file to stabilize on disk before moving it.
    ///
    /// Guards against acting on a file that is visible but still being
    /// flushed: the size must be unchanged across one re-check interval
    /// (or equal the peer's claimed size).
    async fn verify_stable(
        &self,
        path: &std::path::Path,
        claimed_size: u64,
        batch: &BatchState,
    ) -> Result<(), JobError> {
        let recheck = std::time::Duration::from_millis(self.settings.verify_recheck_ms.max(1));
        let mut last = self
            .fs
            .file_size(path)
            .map_err(|e| JobError::Verification(e.to_string()))?;

        for _ in 0..self.settings.verify_max_checks.max(1) {
            if claimed_size > 0 && last == Some(claimed_size) {
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(recheck) => {}
                _ = batch.cancel.cancelled() => return Err(JobError::Cancelled),
            }

            let current = self
                .fs
                .file_size(path)
                .map_err(|e| JobError::Verification(e.to_string()))?;

            if current.is_some() && current == last && current != Some(0) {
                return Ok(());
            }
            last = current;
        }

        Err(JobError::Verification(format!(
            "size did not stabilize within {} checks",
            self.settings.verify_max_checks
        )))
    }

    /// Compute the placement, create directories, move the file into
    /// place, and fetch cover art best-effort.
    async fn organize(
        &self,
        job: &mut DownloadJob,
        staging_path: &std::path::Path,
    ) -> Result<PathBuf, JobError> {
        let placement = self.compute_placement(job).await;
        job.plan = Some(placement.plan.clone());

        self.fs
            .create_dir_all(&placement.directory)
            .map_err(|e| JobError::Filesystem(e.to_string()))?;

        let final_path = placement.final_path();
        if self.fs.exists(&final_path) {
            // Another job (or an earlier run) already placed this track
            info!(
                "Job {} destination already exists, dropping staged copy: {:?}",
                job.id, final_path
            );
            self.fs
                .remove_file(staging_path)
                .map_err(|e| JobError::Filesystem(e.to_string()))?;
        } else {
            self.fs
                .rename(staging_path, &final_path)
                .map_err(|e| JobError::Filesystem(e.to_string()))?;
        }

        self.fetch_cover_art(job, &placement).await;

        Ok(final_path)
    }

    async fn compute_placement(&self, job: &DownloadJob) -> TrackPlacement {
        let resolved = job.resolved.as_ref();
        let confirmed_title = job
            .confirmed
            .as_ref()
            .and_then(|c| c.track.as_ref())
            .map(|t| t.name.as_str());

        let input = ClassificationInput {
            raw: &job.raw,
            artist: resolved.map(|c| &c.artist),
            track: resolved.and_then(|c| c.track.as_ref()),
            album: resolved.and_then(|c| c.album.as_ref()),
            confirmed_title,
            forced_album_mode: job.forced_album_mode,
            forced_album_name: job.forced_album_name.as_deref(),
            album_context: job.raw.album_text().is_some(),
            batch_seq: Some(job.batch_seq),
        };

        self.placement.resolve(&input).await
    }

    /// Best-effort cover art for album placements; never fails the job.
    async fn fetch_cover_art(&self, job: &DownloadJob, placement: &TrackPlacement) {
        let Some(cover_path) = placement.cover_path.as_ref() else {
            return;
        };
        if self.fs.exists(cover_path) {
            return;
        }
        let Some(album_id) = job
            .resolved
            .as_ref()
            .and_then(|c| c.album.as_ref())
            .map(|a| a.id.clone())
        else {
            return;
        };

        match self.resolver.fetch_cover(&album_id).await {
            Ok(bytes) if !bytes.is_empty() => {
                if let Err(e) = self.fs.write(cover_path, &bytes) {
                    warn!("Writing cover art for job {} failed: {}", job.id, e);
                } else {
                    debug!("Cover art written: {:?}", cover_path);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Cover art fetch for job {} failed: {}", job.id, e),
        }
    }
}

/// Worker loop: pull jobs from the shared queue until shutdown.
async fn run_worker(
    manager: Arc<SyncManager>,
    job_rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    idx: usize,
) {
    debug!("Worker {} started", idx);
    loop {
        let item = {
            let mut rx = job_rx.lock().await;
            tokio::select! {
                item = rx.recv() => item,
                _ = manager.shutdown.cancelled() => None,
            }
        };

        let Some(item) = item else {
            debug!("Worker {} stopping", idx);
            break;
        };

        manager.process_job(item).await;
    }
}
