//! In-memory stand-ins for the extraction tool and the backend.

use crate::error::PipelineError;
use crate::extract::{FrameExtractor, FrameSet};
use crate::model::{ExtractParams, TaskSnapshot, TaskStatus};
use crate::node::{HostLoad, LoadProbe, NodeConnector, TaskApi};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub(crate) fn snapshot(status: TaskStatus, progress: f64) -> TaskSnapshot {
    TaskSnapshot {
        task_id: "t-1".into(),
        status,
        progress,
        processing_time_ms: 1_500,
        images_count: 10,
        last_error: None,
    }
}

pub(crate) fn poll_fault(transient: bool) -> PipelineError {
    PipelineError::Poll {
        task_id: "t-1".into(),
        reason: "connection reset".into(),
        transient,
    }
}

/// Writes `count` empty frames, like a video of `count` seconds at 1 fps.
#[derive(Debug, Clone)]
pub(crate) struct FakeExtractor {
    pub count: usize,
    pub calls: Arc<Mutex<usize>>,
}

impl FakeExtractor {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl FrameExtractor for FakeExtractor {
    async fn extract(
        &self,
        _video: &Path,
        out_dir: &Path,
        _params: &ExtractParams,
    ) -> Result<FrameSet, PipelineError> {
        *self.calls.lock().unwrap() += 1;
        std::fs::create_dir_all(out_dir).unwrap();
        for i in 1..=self.count {
            std::fs::write(out_dir.join(format!("frame_{i:06}.jpg")), b"jpeg").unwrap();
        }
        FrameSet::scan(out_dir)
    }
}

#[derive(Debug, Default)]
pub(crate) struct TaskState {
    pub statuses: VecDeque<Result<TaskSnapshot, PipelineError>>,
    pub polls: usize,
    pub created_with: Vec<usize>,
    pub created_names: Vec<String>,
    pub options: Vec<BTreeMap<String, Value>>,
    pub downloads: usize,
    /// Number of polls that had happened when the download started.
    pub polls_before_download: Option<usize>,
    pub fail_submission: bool,
}

/// Scripted task backend. Shared state survives cloning.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTask {
    state: Arc<Mutex<TaskState>>,
    artifacts: Vec<(&'static str, &'static [u8])>,
}

impl FakeTask {
    pub fn scripted(statuses: Vec<Result<TaskSnapshot, PipelineError>>) -> Self {
        let task = Self {
            state: Arc::default(),
            artifacts: vec![
                ("odm_orthophoto/odm_orthophoto.tif", &b"ortho"[..]),
                ("odm_dem/dsm.tif", &b"dsm"[..]),
                ("odm_texturing/odm_textured_model.obj", &b"mesh"[..]),
                ("odm_report/report.pdf", &b"%PDF"[..]),
                ("images.json", &b"[]"[..]),
            ],
        };
        task.state.lock().unwrap().statuses = statuses.into();
        task
    }

    pub fn failing_submission(self) -> Self {
        self.state.lock().unwrap().fail_submission = true;
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, TaskState> {
        self.state.lock().unwrap()
    }
}

impl TaskApi for FakeTask {
    async fn create_task(
        &self,
        name: &str,
        images: &[PathBuf],
        options: &BTreeMap<String, Value>,
    ) -> Result<String, PipelineError> {
        let mut state = self.state();
        if state.fail_submission {
            return Err(PipelineError::Submission("connection refused".into()));
        }
        state.created_with.push(images.len());
        state.created_names.push(name.to_string());
        state.options.push(options.clone());
        Ok("t-1".into())
    }

    async fn poll_status(&self, _task_id: &str) -> Result<TaskSnapshot, PipelineError> {
        let mut state = self.state();
        state.polls += 1;
        state
            .statuses
            .pop_front()
            .unwrap_or_else(|| Err(poll_fault(false)))
    }

    async fn download_outputs(
        &self,
        _task_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        {
            let mut state = self.state();
            state.downloads += 1;
            state.polls_before_download = Some(state.polls);
        }
        let mut written = Vec::new();
        for (name, data) in &self.artifacts {
            let path = dest.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, data).unwrap();
            written.push(path);
        }
        Ok(written)
    }

    async fn console_output(&self, _task_id: &str) -> Result<Vec<String>, PipelineError> {
        Ok(vec!["[INFO] fake engine".into()])
    }
}

/// Connector over fixed host loads that hands out one shared [`FakeTask`].
#[derive(Debug, Clone)]
pub(crate) struct FakeConnector {
    pub loads: HashMap<String, u64>,
    pub task: FakeTask,
    pub probes: Arc<Mutex<usize>>,
    pub connected: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    pub fn new(loads: &[(&str, u64)], task: FakeTask) -> Self {
        Self {
            loads: loads.iter().map(|(h, l)| (h.to_string(), *l)).collect(),
            task,
            probes: Arc::default(),
            connected: Arc::default(),
        }
    }
}

impl LoadProbe for FakeConnector {
    async fn probe(&self, host: &str) -> Result<HostLoad, String> {
        *self.probes.lock().unwrap() += 1;
        self.loads
            .get(host)
            .map(|q| HostLoad {
                queue: *q,
                engine: None,
                version: None,
            })
            .ok_or_else(|| "connection refused".into())
    }
}

impl NodeConnector for FakeConnector {
    type Client = FakeTask;

    fn connect(&self, host: &str) -> Result<FakeTask, PipelineError> {
        self.connected.lock().unwrap().push(host.to_string());
        Ok(self.task.clone())
    }
}
