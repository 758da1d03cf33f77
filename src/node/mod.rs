//! Access to NodeODM-compatible reconstruction backends.
//!
//! The orchestrator only sees the traits in this module. [`HttpConnector`]
//! implements them over HTTP; tests substitute in-memory fakes.

mod archive;
mod client;
pub(crate) mod hosts;
#[cfg(test)]
pub(crate) mod stub;

pub(crate) use client::NodeClient;

use crate::error::PipelineError;
use crate::model::{RunConfig, RunEvent, TaskSnapshot};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Load report of one backend host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostLoad {
    pub queue: u64,
    pub engine: Option<String>,
    pub version: Option<String>,
}

/// Lightweight load probe used by host selection.
pub(crate) trait LoadProbe {
    /// Query one host. The error is a human-readable reason.
    async fn probe(&self, host: &str) -> Result<HostLoad, String>;
}

/// Remote task lifecycle on one backend.
pub(crate) trait TaskApi {
    /// Upload all images with the options and return the backend task id.
    async fn create_task(
        &self,
        name: &str,
        images: &[PathBuf],
        options: &BTreeMap<String, Value>,
    ) -> Result<String, PipelineError>;

    /// Read-only status fetch; safe to repeat.
    async fn poll_status(&self, task_id: &str) -> Result<TaskSnapshot, PipelineError>;

    /// Fetch the full output bundle of a completed task into `dest`.
    async fn download_outputs(
        &self,
        task_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError>;

    /// Engine console lines for the task.
    async fn console_output(&self, task_id: &str) -> Result<Vec<String>, PipelineError>;
}

/// Probes hosts and opens task clients against the chosen one.
pub(crate) trait NodeConnector: LoadProbe {
    type Client: TaskApi;

    fn connect(&self, host: &str) -> Result<Self::Client, PipelineError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    task_queue_count: Option<u64>,
    engine: Option<String>,
    engine_version: Option<String>,
    version: Option<String>,
    error: Option<String>,
}

/// HTTP implementation of [`NodeConnector`].
#[derive(Clone)]
pub(crate) struct HttpConnector {
    http: reqwest::Client,
    probe_timeout: Duration,
    request_timeout: Duration,
    parallel_uploads: usize,
    upload_batch_size: usize,
    events: Option<UnboundedSender<RunEvent>>,
}

impl HttpConnector {
    pub fn new(cfg: &RunConfig, events: Option<UnboundedSender<RunEvent>>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(cfg.probe_timeout.max(Duration::from_secs(1)))
            .build()?;
        Ok(Self {
            http,
            probe_timeout: cfg.probe_timeout,
            request_timeout: cfg.request_timeout,
            parallel_uploads: cfg.parallel_uploads.max(1),
            upload_batch_size: cfg.upload_batch_size.max(1),
            events,
        })
    }
}

impl LoadProbe for HttpConnector {
    async fn probe(&self, host: &str) -> Result<HostLoad, String> {
        let url = format!("{}/info", host.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let info: InfoResponse = resp
            .json()
            .await
            .map_err(|e| format!("invalid /info payload: {e}"))?;
        if let Some(err) = info.error {
            return Err(err);
        }
        let queue = info
            .task_queue_count
            .ok_or_else(|| "missing taskQueueCount".to_string())?;
        Ok(HostLoad {
            queue,
            engine: match (info.engine, info.engine_version) {
                (Some(e), Some(v)) => Some(format!("{e} {v}")),
                (e, _) => e,
            },
            version: info.version,
        })
    }
}

impl NodeConnector for HttpConnector {
    type Client = NodeClient;

    fn connect(&self, host: &str) -> Result<NodeClient, PipelineError> {
        let base = reqwest::Url::parse(host)
            .map_err(|e| PipelineError::Input(format!("invalid backend url {host}: {e}")))?;
        Ok(NodeClient::new(
            self.http.clone(),
            base,
            client::Limits {
                request_timeout: self.request_timeout,
                parallel_uploads: self.parallel_uploads,
                upload_batch_size: self.upload_batch_size,
            },
            self.events.clone(),
        ))
    }
}
