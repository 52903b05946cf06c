//! Per-batch aggregation of job completion/failure events.
//!
//! Finished jobs are never reported one at a time: an entire album failing
//! in one network blink would otherwise cascade into dozens of downstream
//! updates. Each SyncBatch gets one batcher task that buffers terminal
//! outcomes and flushes them when a collection window elapses — short for
//! failures, longer for successes — or as soon as the whole batch is
//! accounted for, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::debug;

use super::models::{BatchCounters, BatchReport, JobOutcome, JobState};

/// Collection windows for the two outcome kinds.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindows {
    /// Window for failures (and cancellations): short, bad news travels
    /// together and fast.
    pub failure: Duration,
    /// Window for successes.
    pub success: Duration,
}

impl Default for BatchWindows {
    fn default() -> Self {
        Self {
            failure: Duration::from_millis(500),
            success: Duration::from_millis(2000),
        }
    }
}

/// Spawns per-batch aggregation tasks.
pub struct EventBatcher;

impl EventBatcher {
    /// Spawn the batcher task for one batch and return the sender workers
    /// deliver terminal outcomes to.
    ///
    /// The task exits once `total` outcomes have been flushed, or when all
    /// senders are dropped (remaining outcomes are flushed first).
    pub fn spawn(
        batch_id: String,
        total: usize,
        windows: BatchWindows,
        counters: Arc<BatchCounters>,
        reports: broadcast::Sender<BatchReport>,
    ) -> mpsc::UnboundedSender<JobOutcome> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_batcher(
            batch_id, total, windows, counters, reports, rx,
        ));
        tx
    }
}

async fn run_batcher(
    batch_id: String,
    total: usize,
    windows: BatchWindows,
    counters: Arc<BatchCounters>,
    reports: broadcast::Sender<BatchReport>,
    mut rx: mpsc::UnboundedReceiver<JobOutcome>,
) {
    let mut pending: Vec<JobOutcome> = Vec::new();
    let mut reported = 0usize;
    let mut deadline: Option<Instant> = None;

    loop {
        let current_deadline = deadline;
        let wait = async move {
            match current_deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            outcome = rx.recv() => {
                match outcome {
                    Some(outcome) => {
                        let window = match outcome.state {
                            JobState::Completed => windows.success,
                            _ => windows.failure,
                        };
                        let candidate_deadline = Instant::now() + window;
                        deadline = Some(match deadline {
                            Some(d) => d.min(candidate_deadline),
                            None => candidate_deadline,
                        });
                        pending.push(outcome);

                        // The whole batch is accounted for: flush now
                        // rather than waiting out the window.
                        if reported + pending.len() >= total {
                            flush(&batch_id, total, &counters, &reports, &mut pending, &mut reported);
                            deadline = None;
                        }
                    }
                    None => {
                        // All workers done with this batch
                        if !pending.is_empty() {
                            flush(&batch_id, total, &counters, &reports, &mut pending, &mut reported);
                        }
                        break;
                    }
                }
            }
            _ = wait => {
                flush(&batch_id, total, &counters, &reports, &mut pending, &mut reported);
                deadline = None;
            }
        }

        if reported >= total {
            break;
        }
    }

    debug!("Batcher for {} finished after {} outcomes", batch_id, reported);
}

fn flush(
    batch_id: &str,
    total: usize,
    counters: &BatchCounters,
    reports: &broadcast::Sender<BatchReport>,
    pending: &mut Vec<JobOutcome>,
    reported: &mut usize,
) {
    if pending.is_empty() {
        return;
    }

    let mut completed = Vec::new();
    let mut failed = Vec::new();
    let mut cancelled = Vec::new();
    for outcome in pending.drain(..) {
        *reported += 1;
        match outcome.state {
            JobState::Completed => completed.push(outcome),
            JobState::Cancelled => cancelled.push(outcome),
            _ => failed.push(outcome),
        }
    }

    debug!(
        "Flushing batch {}: {} completed, {} failed, {} cancelled",
        batch_id,
        completed.len(),
        failed.len(),
        cancelled.len()
    );

    // Nobody listening is fine; reports are best-effort
    let _ = reports.send(BatchReport {
        batch_id: batch_id.to_string(),
        completed,
        failed,
        cancelled,
        progress: counters.snapshot(total),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::error::{FailureClass, JobFailure};

    fn outcome(id: &str, state: JobState) -> JobOutcome {
        JobOutcome {
            job_id: id.to_string(),
            label: format!("Artist - {}", id),
            state,
            error: match state {
                JobState::Failed => Some(JobFailure {
                    class: FailureClass::Transfer,
                    message: "peer gone".to_string(),
                }),
                _ => None,
            },
            final_path: None,
        }
    }

    fn setup(
        total: usize,
    ) -> (
        mpsc::UnboundedSender<JobOutcome>,
        broadcast::Receiver<BatchReport>,
        Arc<BatchCounters>,
    ) {
        let (reports_tx, reports_rx) = broadcast::channel(64);
        let counters = Arc::new(BatchCounters::default());
        let tx = EventBatcher::spawn(
            "batch-1".to_string(),
            total,
            BatchWindows::default(),
            counters.clone(),
            reports_tx,
        );
        (tx, reports_rx, counters)
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_failures_single_flush() {
        let (tx, mut reports, counters) = setup(15);

        // 15 jobs fail within the same instant
        for i in 0..15 {
            counters.start_job();
            counters.finish_job(JobState::Failed);
            tx.send(outcome(&format!("job-{}", i), JobState::Failed))
                .unwrap();
        }

        // Exactly one aggregated flush
        let report = reports.recv().await.unwrap();
        assert_eq!(report.failed.len(), 15);
        assert_eq!(report.completed.len(), 0);
        assert_eq!(report.progress.failed, 15);
        assert_eq!(report.progress.percent, 100);

        // No second report follows
        assert!(matches!(
            reports.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_flush_before_window() {
        let (tx, mut reports, counters) = setup(3);

        for i in 0..3 {
            counters.start_job();
            counters.finish_job(JobState::Completed);
            tx.send(outcome(&format!("job-{}", i), JobState::Completed))
                .unwrap();
        }

        let report = reports.recv().await.unwrap();
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.progress.percent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_flushes_on_window() {
        let (tx, mut reports, counters) = setup(10);

        counters.start_job();
        counters.finish_job(JobState::Failed);
        tx.send(outcome("job-0", JobState::Failed)).unwrap();

        // Window elapses (auto-advanced under paused time); one flush with
        // just the single failure
        let report = reports.recv().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.progress.total, 10);
        assert!(report.progress.percent < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_and_failure_windows_are_independent() {
        let (tx, mut reports, counters) = setup(10);

        counters.start_job();
        counters.finish_job(JobState::Failed);
        tx.send(outcome("job-fail", JobState::Failed)).unwrap();

        let first = reports.recv().await.unwrap();
        assert_eq!(first.failed.len(), 1);

        counters.start_job();
        counters.finish_job(JobState::Completed);
        tx.send(outcome("job-ok", JobState::Completed)).unwrap();

        let second = reports.recv().await.unwrap();
        assert_eq!(second.completed.len(), 1);
        assert_eq!(second.failed.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_shortens_pending_success_window() {
        let (tx, mut reports, counters) = setup(10);

        // A success opens the long window...
        counters.start_job();
        counters.finish_job(JobState::Completed);
        tx.send(outcome("job-ok", JobState::Completed)).unwrap();

        // ...then a failure arrives and pulls the deadline in; both land
        // in the same early flush.
        counters.start_job();
        counters.finish_job(JobState::Failed);
        tx.send(outcome("job-fail", JobState::Failed)).unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_sender_flushes_remainder() {
        let (tx, mut reports, counters) = setup(100);

        counters.start_job();
        counters.finish_job(JobState::Cancelled);
        tx.send(outcome("job-0", JobState::Cancelled)).unwrap();
        drop(tx);

        let report = reports.recv().await.unwrap();
        assert_eq!(report.cancelled.len(), 1);
    }
}
