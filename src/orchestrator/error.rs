//! Typed failure taxonomy for download jobs.
//!
//! The split drives behavior: resolution problems are soft and recovered
//! with fallback naming, transfer/verification problems retry with
//! backoff, filesystem problems surface immediately, and cancellation is
//! not an error at all.

use serde::Serialize;

use crate::transfer::TransferError;

/// Failure class recorded on jobs and surfaced in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Resolution,
    Transfer,
    Verification,
    Filesystem,
    Cancelled,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Resolution => "resolution",
            FailureClass::Transfer => "transfer",
            FailureClass::Verification => "verification",
            FailureClass::Filesystem => "filesystem",
            FailureClass::Cancelled => "cancelled",
        }
    }
}

/// Errors raised while driving one job through its state machine.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Catalog unreachable or no confident candidate. Recovered locally,
    /// never stored as a terminal failure.
    #[error("resolution failed: {0}")]
    Resolution(String),
    /// Network/peer error during transfer. Retried up to the ceiling.
    #[error("transfer failed: {0}")]
    Transfer(String),
    /// The delivered file never stabilized on disk. Retried like a
    /// transfer failure.
    #[error("file never stabilized: {0}")]
    Verification(String),
    /// Permission/space/path error during organizing. Not retried.
    #[error("filesystem operation failed: {0}")]
    Filesystem(String),
    /// Cancellation signal, not an error.
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    pub fn class(&self) -> FailureClass {
        match self {
            JobError::Resolution(_) => FailureClass::Resolution,
            JobError::Transfer(_) => FailureClass::Transfer,
            JobError::Verification(_) => FailureClass::Verification,
            JobError::Filesystem(_) => FailureClass::Filesystem,
            JobError::Cancelled => FailureClass::Cancelled,
        }
    }

    /// Transfer and verification failures retry; everything else does not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Transfer(_) | JobError::Verification(_))
    }
}

impl From<TransferError> for JobError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::Cancelled => JobError::Cancelled,
            other => JobError::Transfer(other.to_string()),
        }
    }
}

/// A failure as recorded on a job: class plus human-readable message.
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub class: FailureClass,
    pub message: String,
}

impl From<&JobError> for JobFailure {
    fn from(e: &JobError) -> Self {
        Self {
            class: e.class(),
            message: e.to_string(),
        }
    }
}
