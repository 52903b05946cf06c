//! Concurrent download/organization orchestration.
//!
//! Owns the worker pool, the per-job state machine, retry and cancellation
//! semantics, and the batching of completion/failure events toward the
//! outside world.

mod batcher;
mod error;
mod manager;
mod models;
mod retry;

pub use batcher::{BatchWindows, EventBatcher};
pub use error::{FailureClass, JobError, JobFailure};
pub use manager::SyncManager;
pub use models::{
    BatchCounters, BatchProgress, BatchReport, DownloadJob, JobOutcome, JobState, SyncBatchHandle,
    SyncRequest,
};
pub use retry::RetryPolicy;
