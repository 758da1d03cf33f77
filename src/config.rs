//! Layered configuration.
//!
//! Built-in defaults, then the YAML file, then the environment (host list),
//! then CLI overrides applied by [`crate::cli`].

use crate::node::hosts::parse_host_list;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "configs/default.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub project: ProjectConfig,
    pub runtime: RuntimeConfig,
    pub odm: OdmConfig,
    pub video: VideoConfig,
    pub odm_options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Photogrammetry-ODM".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
    /// Copy the headline outputs into `processed/` after a run.
    pub copy_processed: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("runs"),
            data_dir: PathBuf::from("data"),
            log_level: "info".into(),
            copy_processed: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// Name of the environment variable holding the comma-separated host list.
    pub host_env: String,
    pub host_default: String,
    pub parallel_uploads: usize,
    pub poll_seconds: u64,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_poll_errors: u32,
    pub probe_rounds: u32,
    pub upload_batch_size: usize,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            host_env: "ODM_HOST".into(),
            host_default: "http://localhost:3000".into(),
            parallel_uploads: 4,
            poll_seconds: 10,
            probe_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            max_poll_errors: 30,
            probe_rounds: 3,
            upload_batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub fps: f64,
    pub max_frames: u32,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    pub ffmpeg_bin: PathBuf,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fps: 1.0,
            max_frames: 0,
            start_seconds: 0.0,
            duration_seconds: 0.0,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Load the config file. A missing file falls back to defaults unless the
    /// path was given explicitly.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        if !path.exists() {
            if explicit {
                anyhow::bail!(
                    "config not found: {}. Create it or run without --config to use defaults.",
                    path.display()
                );
            }
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: AppConfig = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    /// Resolve the backend host list from the value of the `odm.host_env`
    /// variable, falling back to `odm.host_default`.
    pub fn hosts_from(&self, raw: Option<&str>) -> Result<Vec<String>> {
        let hosts = match raw {
            Some(raw) => parse_host_list(raw)
                .with_context(|| format!("parse {}", self.odm.host_env))?,
            None => Vec::new(),
        };
        if !hosts.is_empty() {
            return Ok(hosts);
        }
        parse_host_list(&self.odm.host_default).context("parse odm.host_default")
    }
}
