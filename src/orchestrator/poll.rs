//! Status polling until the remote task reaches a terminal state.

use crate::error::PipelineError;
use crate::model::{RunEvent, TaskSnapshot, TaskStatus};
use crate::node::TaskApi;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub(crate) struct PollPolicy {
    pub interval: Duration,
    /// Consecutive transient failures tolerated before giving up.
    pub max_transient_errors: u32,
}

/// Poll `task_id` at a fixed interval until it completes, fails or is canceled.
///
/// Status checks are strictly sequential. `on_snapshot` sees every successful
/// response. Failed and canceled tasks surface as [`PipelineError::TaskFailed`].
pub(crate) async fn wait_for_completion<C: TaskApi>(
    client: &C,
    task_id: &str,
    policy: PollPolicy,
    events: &UnboundedSender<RunEvent>,
    mut on_snapshot: impl FnMut(&TaskSnapshot),
) -> Result<TaskSnapshot, PipelineError> {
    let mut consecutive_errors = 0u32;
    let mut last_reported: Option<(TaskStatus, f64)> = None;

    loop {
        match client.poll_status(task_id).await {
            Ok(snap) => {
                consecutive_errors = 0;
                on_snapshot(&snap);
                if last_reported != Some((snap.status, snap.progress)) {
                    debug!(task = %task_id, status = %snap.status, progress = snap.progress, "task status");
                    let _ = events.send(RunEvent::TaskProgress {
                        status: snap.status,
                        progress: snap.progress,
                    });
                    last_reported = Some((snap.status, snap.progress));
                }
                match snap.status {
                    TaskStatus::Completed => {
                        info!(task = %task_id, processing_ms = snap.processing_time_ms, "task completed");
                        return Ok(snap);
                    }
                    TaskStatus::Failed | TaskStatus::Canceled => {
                        return Err(PipelineError::TaskFailed {
                            task_id: task_id.to_string(),
                            status: snap.status.to_string(),
                            message: snap.last_error,
                        });
                    }
                    TaskStatus::Queued | TaskStatus::Running => {}
                }
            }
            Err(e) if e.is_transient() => {
                consecutive_errors += 1;
                if consecutive_errors >= policy.max_transient_errors {
                    error!(task = %task_id, attempts = consecutive_errors, error = %e, "giving up on polling");
                    return Err(e);
                }
                warn!(
                    task = %task_id,
                    attempt = consecutive_errors,
                    max = policy.max_transient_errors,
                    error = %e,
                    "poll failed, retrying"
                );
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(policy.interval).await;
    }
}
