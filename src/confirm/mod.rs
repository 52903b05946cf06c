//! Confirmation collaborator interface.
//!
//! An interactive frontend may let the user pick among ambiguous matches.
//! From the core's point of view that whole interaction is one async
//! question: "do you have a confirmed candidate for this job?" — answered
//! before Resolving completes, with no assumption about how the answer was
//! produced or how long it took.

use async_trait::async_trait;

use crate::model::RawResult;
use crate::resolver::MatchCandidate;

/// Supplies pre-confirmed match candidates for jobs.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// A confirmed candidate for this job, when one exists.
    ///
    /// Returning None means "no confirmation available"; the resolver's
    /// top automatic candidate is used instead when it clears the
    /// acceptance threshold.
    async fn confirmed_candidate(&self, job_id: &str, raw: &RawResult) -> Option<MatchCandidate>;
}

/// Default source: never confirms anything, fully-automatic resolution.
pub struct NoConfirmation;

#[async_trait]
impl ConfirmationSource for NoConfirmation {
    async fn confirmed_candidate(&self, _job_id: &str, _raw: &RawResult) -> Option<MatchCandidate> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_confirmation_returns_none() {
        let source = NoConfirmation;
        let raw = RawResult {
            artist: "a".to_string(),
            title: "t".to_string(),
            album: None,
            ext: "mp3".to_string(),
            bitrate_kbps: None,
            peer: "p".to_string(),
            size_bytes: 0,
        };
        assert!(source.confirmed_candidate("job-1", &raw).await.is_none());
    }
}
