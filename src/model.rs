use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Frozen configuration of one run, stored in the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub extract: ExtractParams,
    pub hosts: Vec<String>,
    pub parallel_uploads: usize,
    pub upload_batch_size: usize,
    pub poll_seconds: u64,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_poll_errors: u32,
    pub probe_rounds: u32,
    /// Backend-specific reconstruction options, passed through verbatim.
    #[serde(default)]
    pub odm_options: BTreeMap<String, serde_json::Value>,
    pub copy_processed: bool,
    pub user_agent: String,
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractParams {
    pub fps: f64,
    /// 0 means unlimited.
    pub max_frames: u32,
    pub start_seconds: f64,
    /// 0 means until the end of the video.
    pub duration_seconds: f64,
}

/// Stage of a run. `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Extracting,
    HostSelected,
    Submitted,
    Polling,
    Downloading,
    Summarizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Init, Extracting)
                | (Extracting, HostSelected)
                | (HostSelected, Submitted)
                | (Submitted, Polling)
                | (Polling, Downloading)
                | (Downloading, Summarizing)
                | (Downloading, Done)
                | (Summarizing, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Extracting => "extracting",
            RunState::HostSelected => "host_selected",
            RunState::Submitted => "submitted",
            RunState::Polling => "polling",
            RunState::Downloading => "downloading",
            RunState::Summarizing => "summarizing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote task status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Failed,
    Completed,
    Canceled,
}

impl TaskStatus {
    /// Map a NodeODM status code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            10 => Some(TaskStatus::Queued),
            20 => Some(TaskStatus::Running),
            30 => Some(TaskStatus::Failed),
            40 => Some(TaskStatus::Completed),
            50 => Some(TaskStatus::Canceled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Failed => "failed",
            TaskStatus::Completed => "completed",
            TaskStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known view of a remote task. The backend stays authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    /// 0..=100
    pub progress: f64,
    pub processing_time_ms: u64,
    pub images_count: u64,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Events emitted by the orchestrator and consumed by the CLI layer.
#[derive(Debug, Clone)]
pub enum RunEvent {
    StateChanged {
        run_id: String,
        state: RunState,
    },
    UploadProgress {
        sent: usize,
        total: usize,
    },
    TaskProgress {
        status: TaskStatus,
        progress: f64,
    },
    Info(String),
}

impl RunEvent {
    /// Render a human-readable line for the CLI.
    pub fn to_message(&self) -> String {
        match self {
            RunEvent::StateChanged { run_id, state } => format!("== {run_id}: {state} =="),
            RunEvent::UploadProgress { sent, total } => {
                let pct = if *total == 0 {
                    100
                } else {
                    sent * 100 / total
                };
                format!("Upload: {sent}/{total} images ({pct}%)")
            }
            RunEvent::TaskProgress { status, progress } => {
                format!("Task {status}: {progress:.0}%")
            }
            RunEvent::Info(msg) => msg.clone(),
        }
    }
}
