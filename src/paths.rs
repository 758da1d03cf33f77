//! On-disk layout of a run.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunPaths {
    pub run_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub odm_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub record: PathBuf,
}

impl RunPaths {
    pub fn new(runs_dir: &Path, data_dir: &Path, run_id: &str) -> Self {
        let run_dir = runs_dir.join(run_id);
        Self {
            logs_dir: run_dir.join("logs"),
            odm_dir: run_dir.join("odm"),
            record: run_dir.join("run.json"),
            frames_dir: data_dir.join("interim").join("frames").join(run_id),
            processed_dir: data_dir
                .join("processed")
                .join("odm_results")
                .join(run_id),
            run_dir,
        }
    }

    /// Take exclusive ownership of the run directory.
    ///
    /// Fails if a directory for this run id already exists.
    pub fn claim(&self) -> Result<(), PipelineError> {
        if let Some(parent) = self.run_dir.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io("create runs directory", parent, e))?;
        }
        match std::fs::create_dir(&self.run_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::Input(format!(
                    "run directory {} already exists; pick another run id",
                    self.run_dir.display()
                )));
            }
            Err(e) => return Err(PipelineError::io("create run directory", &self.run_dir, e)),
        }
        for dir in [&self.logs_dir, &self.odm_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| PipelineError::io("create run subdirectory", dir, e))?;
        }
        Ok(())
    }
}

/// Find the input video, falling back to the raw-video area under `data_dir`.
pub(crate) fn resolve_video(video: &Path, data_dir: &Path) -> Result<PathBuf, PipelineError> {
    if video.is_file() {
        return Ok(video.to_path_buf());
    }
    let raw = data_dir.join("raw").join(video);
    if raw.is_file() {
        return Ok(raw);
    }
    Err(PipelineError::Input(format!(
        "video not found: {} (also looked in {})",
        video.display(),
        data_dir.join("raw").display()
    )))
}
