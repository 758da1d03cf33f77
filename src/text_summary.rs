//! Text summary builder for CLI output.
//!
//! Formats the human-readable end-of-run lines from a run record.

use crate::storage::RunRecord;
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished (or failed) run record.
pub(crate) fn build_text_summary(record: &RunRecord) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Run: {} ({})", record.run_id, record.state));
    lines.push(format!("Video: {}", record.video.display()));
    lines.push(format!("Created: {}", record.created));
    if let Some(host) = record.host.as_deref() {
        lines.push(format!("Host: {host}"));
    }
    if let Some(task_id) = record.task_id.as_deref() {
        lines.push(format!("Task: {task_id}"));
    }
    lines.push(format!("Frames: {}", record.frame_count));

    if let Some(task) = record.task.as_ref() {
        let took = Duration::from_secs(task.processing_time_ms / 1000);
        lines.push(format!(
            "Task status: {} {:.0}% ({} images, processing {})",
            task.status,
            task.progress,
            task.images_count,
            humantime::format_duration(took)
        ));
    }

    if let Some(dir) = record.output_dir.as_ref() {
        lines.push(format!(
            "Outputs: {} ({} files)",
            dir.display(),
            record.downloaded_files
        ));
    }
    if !record.summary_files.is_empty() {
        lines.push(format!("Summary copies: {}", record.summary_files.len()));
        for f in &record.summary_files {
            lines.push(format!("  {}", f.display()));
        }
    }

    if let Some(stage) = record.failed_stage {
        lines.push(format!("Failed during: {stage}"));
    }
    if let Some(err) = record.error.as_deref() {
        lines.push(format!("Error: {err}"));
    }

    TextSummary { lines }
}
