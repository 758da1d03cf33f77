//! Run record persistence (`runs/<run_id>/run.json`).

use crate::model::{RunConfig, RunState, TaskSnapshot};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub video: PathBuf,
    /// RFC 3339 creation time.
    pub created: String,
    pub config: RunConfig,
    pub state: RunState,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub frame_count: usize,
    #[serde(default)]
    pub task: Option<TaskSnapshot>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub downloaded_files: usize,
    #[serde(default)]
    pub summary_files: Vec<PathBuf>,
    #[serde(default)]
    pub failed_stage: Option<RunState>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn new(run_id: String, video: PathBuf, created: String, config: RunConfig) -> Self {
        Self {
            run_id,
            video,
            created,
            config,
            state: RunState::Init,
            host: None,
            task_id: None,
            frame_count: 0,
            task: None,
            output_dir: None,
            downloaded_files: 0,
            summary_files: Vec::new(),
            failed_stage: None,
            error: None,
        }
    }
}

/// Write the record as pretty JSON via a temp file and rename.
pub fn save_record(path: &Path, record: &RunRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

pub fn load_record(path: &Path) -> Result<RunRecord> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let record = serde_json::from_slice(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(record)
}
