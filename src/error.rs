//! Error taxonomy for a pipeline run.
//!
//! Every stage maps its failures onto one [`PipelineError`] variant. The
//! orchestrator wraps the variant in a [`RunError`] that also names the run
//! and the stage it was in, so a failure can be matched against the
//! filesystem layout.

use crate::model::RunState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum PipelineError {
    /// Bad or missing local input (video path, run id, extraction parameters).
    #[error("input error: {0}")]
    Input(String),

    /// The frame extraction tool failed or produced nothing.
    #[error("frame extraction failed: {reason}")]
    Extraction { reason: String },

    /// No configured backend answered the load probe.
    #[error("no backend host available ({})", .failures.join("; "))]
    NoHostAvailable { failures: Vec<String> },

    /// Task creation or image upload was rejected or interrupted.
    #[error("task submission failed: {0}")]
    Submission(String),

    /// A status request failed. Transient failures may be retried by the poll loop.
    #[error("polling task {task_id} failed: {reason}")]
    Poll {
        task_id: String,
        reason: String,
        transient: bool,
    },

    /// The backend finished the task without producing results.
    #[error("task {task_id} ended with status {status}: {}", .message.as_deref().unwrap_or("no error reported"))]
    TaskFailed {
        task_id: String,
        status: String,
        message: Option<String>,
    },

    /// Result retrieval failed or was attempted before completion.
    #[error("downloading outputs of task {task_id} failed: {reason}")]
    Download { task_id: String, reason: String },

    /// Local filesystem failure while laying out the run.
    #[error("{context} ({})", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Whether the poll loop may retry after this error.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Poll { transient: true, .. })
    }
}

/// A failed run: which run, which stage, and why.
#[derive(Debug, Error)]
#[error("run {} failed during {stage}", .run_id.as_deref().unwrap_or("<unassigned>"))]
pub(crate) struct RunError {
    pub run_id: Option<String>,
    pub stage: RunState,
    #[source]
    pub source: PipelineError,
}

/// Render an error and every source below it on one line, joined by `: `.
pub(crate) fn chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut next = err.source();
    while let Some(e) = next {
        out.push_str(": ");
        out.push_str(&e.to_string());
        next = e.source();
    }
    out
}
