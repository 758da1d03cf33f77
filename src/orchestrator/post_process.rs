//! Post-download processing.
//!
//! Copies the commonly used deliverables out of the raw backend output and
//! keeps the engine console log next to the run.

use crate::error::PipelineError;
use crate::node::TaskApi;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Deliverables copied into the processed area, relative to the output tree.
pub(crate) const SUMMARY_ARTIFACTS: &[&str] = &[
    "odm_orthophoto/odm_orthophoto.tif",
    "odm_orthophoto/odm_orthophoto.png",
    "odm_dem/dsm.tif",
    "odm_dem/dtm.tif",
    "odm_georeferencing/odm_georeferenced_model.laz",
    "odm_texturing/odm_textured_model.obj",
    "odm_texturing/odm_textured_model_geo.obj",
    "odm_mesh/odm_mesh.ply",
    "odm_report/report.pdf",
];

/// Copy the known deliverables that exist under `odm_dir` flat into `processed_dir`.
///
/// The raw output is left untouched. Missing artifacts are skipped; the
/// returned paths are the copies that were made.
pub(crate) fn copy_summary_outputs(
    odm_dir: &Path,
    processed_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut copied = Vec::new();
    for rel in SUMMARY_ARTIFACTS {
        let src = odm_dir.join(rel);
        if !src.is_file() {
            debug!(artifact = *rel, "not produced, skipping");
            continue;
        }
        let Some(name) = src.file_name() else {
            continue;
        };
        std::fs::create_dir_all(processed_dir)
            .map_err(|e| PipelineError::io("create processed directory", processed_dir, e))?;
        let dst = processed_dir.join(name);
        std::fs::copy(&src, &dst).map_err(|e| PipelineError::io("copy artifact", &src, e))?;
        copied.push(dst);
    }
    Ok(copied)
}

/// Save the task's console output to `path`. Failures only produce a warning.
pub(crate) async fn save_console_log<C: TaskApi>(client: &C, task_id: &str, path: &Path) {
    let lines = match client.console_output(task_id).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(task = %task_id, error = %e, "could not fetch console output");
            return;
        }
    };
    let mut text = lines.join("\n");
    text.push('\n');
    if let Err(e) = tokio::fs::write(path, text).await {
        warn!(path = %path.display(), error = %e, "could not write console log");
    }
}
