//! Job, batch and progress models for the orchestrator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::model::RawResult;
use crate::naming::NamingPlan;
use crate::resolver::{AlbumHint, MatchCandidate};

use super::error::JobFailure;

/// State of a download job.
///
/// `Queued → Resolving → Transferring → Verifying → Organizing →
/// Completed`, with `Failed` reachable from every active state and
/// `Cancelled` from every non-terminal one. Terminal states re-enter the
/// machine only through the explicit retry transition back to `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Resolving,
    Transferring,
    Verifying,
    Organizing,
    Completed, // terminal
    Failed,    // terminal
    Cancelled, // terminal
}

impl JobState {
    /// Returns true for Completed, Failed and Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Resolving => "RESOLVING",
            JobState::Transferring => "TRANSFERRING",
            JobState::Verifying => "VERIFYING",
            JobState::Organizing => "ORGANIZING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (*self, next) {
            (Queued, Resolving) => true,
            (Resolving, Transferring) => true,
            (Transferring, Verifying) => true,
            (Verifying, Organizing) => true,
            (Organizing, Completed) => true,
            // Failure is reachable from every active state (filesystem
            // errors surface during Organizing).
            (Resolving | Transferring | Verifying | Organizing, Failed) => true,
            // Cancellation from any non-terminal state.
            (s, Cancelled) if !s.is_terminal() => true,
            // Explicit retry re-enters the machine.
            (Failed | Completed, Queued) => true,
            _ => false,
        }
    }
}

/// One track download, owned exclusively by the orchestrator.
///
/// Resolved metadata is attached through the explicit optional fields
/// below; nothing is ever bolted onto a job ad hoc.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Stable job id.
    pub id: String,
    pub raw: RawResult,
    /// The caller explicitly requested album structure.
    pub forced_album_mode: bool,
    /// Album name the caller forced, if any.
    pub forced_album_name: Option<String>,
    /// Candidate confirmed by the confirmation collaborator.
    pub confirmed: Option<MatchCandidate>,
    /// Candidate the resolver settled on.
    pub resolved: Option<MatchCandidate>,
    pub state: JobState,
    /// Attempts made so far (failures, not including the current run).
    pub attempts: u32,
    pub last_error: Option<JobFailure>,
    /// Naming plan, set once Organizing has computed it.
    pub plan: Option<NamingPlan>,
    /// 1-based position within the originating batch.
    pub batch_seq: u32,
    /// When the job was created (Unix timestamp).
    pub created_at: i64,
    /// When a worker first picked the job up.
    pub started_at: Option<i64>,
    /// When the job reached a terminal state.
    pub completed_at: Option<i64>,
}

impl DownloadJob {
    pub fn new(
        raw: RawResult,
        batch_seq: u32,
        forced_album_mode: bool,
        forced_album_name: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw,
            forced_album_mode,
            forced_album_name,
            confirmed: None,
            resolved: None,
            state: JobState::Queued,
            attempts: 0,
            last_error: None,
            plan: None,
            batch_seq,
            created_at: chrono::Utc::now().timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Move to `next` if the transition is legal. Returns false (and
    /// leaves the state untouched) otherwise.
    pub fn advance(&mut self, next: JobState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Album hint derived from the raw result, for the resolver.
    pub fn album_hint(&self) -> Option<AlbumHint> {
        self.raw.album_text().map(|name| AlbumHint {
            name: name.to_string(),
            album_id: None,
        })
    }
}

/// A batch of raw results submitted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub results: Vec<RawResult>,
    /// Force album structure for every job in the batch.
    #[serde(default)]
    pub forced_album_mode: bool,
    /// Album name to force, when forcing.
    #[serde(default)]
    pub forced_album_name: Option<String>,
}

/// Handle returned from submit().
#[derive(Debug, Clone, Serialize)]
pub struct SyncBatchHandle {
    pub id: String,
    pub total: usize,
}

/// Terminal result of one job, as delivered to the event batcher.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    /// "Artist - Title" display label.
    pub label: String,
    pub state: JobState,
    pub error: Option<JobFailure>,
    pub final_path: Option<PathBuf>,
}

impl JobOutcome {
    pub fn completed(job: &DownloadJob, final_path: PathBuf) -> Self {
        Self {
            job_id: job.id.clone(),
            label: job.raw.label(),
            state: JobState::Completed,
            error: None,
            final_path: Some(final_path),
        }
    }

    pub fn failed(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            label: job.raw.label(),
            state: JobState::Failed,
            error: job.last_error.clone(),
            final_path: None,
        }
    }

    pub fn cancelled(job: &DownloadJob) -> Self {
        Self {
            job_id: job.id.clone(),
            label: job.raw.label(),
            state: JobState::Cancelled,
            error: None,
            final_path: None,
        }
    }
}

/// Shared per-batch counters, updated by workers and snapshotted for
/// progress reports.
#[derive(Debug, Default)]
pub struct BatchCounters {
    matched: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    in_progress: AtomicUsize,
}

impl BatchCounters {
    pub fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn start_job(&self) {
        self.in_progress.fetch_add(1, Ordering::SeqCst);
    }

    pub fn finish_job(&self, state: JobState) {
        self.in_progress.fetch_sub(1, Ordering::SeqCst);
        match state {
            JobState::Completed => self.completed.fetch_add(1, Ordering::SeqCst),
            JobState::Cancelled => self.cancelled.fetch_add(1, Ordering::SeqCst),
            _ => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }

    pub fn snapshot(&self, total: usize) -> BatchProgress {
        let completed = self.completed.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);
        let cancelled = self.cancelled.load(Ordering::SeqCst);
        let terminal = completed + failed + cancelled;
        let percent = if total == 0 {
            0
        } else {
            ((terminal * 100) / total) as u8
        };
        BatchProgress {
            total,
            matched: self.matched.load(Ordering::SeqCst),
            completed,
            failed,
            cancelled,
            in_progress: self.in_progress.load(Ordering::SeqCst),
            percent,
        }
    }
}

/// Point-in-time progress snapshot of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    /// Jobs that resolved a confident catalog candidate.
    pub matched: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub in_progress: usize,
    /// Terminal jobs as a percentage of the batch (0-100).
    pub percent: u8,
}

/// One batched flush of finished jobs.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub completed: Vec<JobOutcome>,
    pub failed: Vec<JobOutcome>,
    pub cancelled: Vec<JobOutcome>,
    pub progress: BatchProgress,
}
