//! Frame extraction through an external tool.

use crate::error::PipelineError;
use crate::model::ExtractParams;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub(crate) const FRAME_PREFIX: &str = "frame_";
pub(crate) const FRAME_EXT: &str = "jpg";

/// Turns one video into numbered still images under `out_dir`.
pub(crate) trait FrameExtractor {
    async fn extract(
        &self,
        video: &Path,
        out_dir: &Path,
        params: &ExtractParams,
    ) -> Result<FrameSet, PipelineError>;
}

/// Ordered frames of one run, numbered from 1 in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FrameSet {
    frames: Vec<PathBuf>,
}

impl FrameSet {
    /// Collect `frame_*.jpg` files in `dir`, sorted by index.
    pub fn scan(dir: &Path) -> Result<Self, PipelineError> {
        let entries =
            std::fs::read_dir(dir).map_err(|e| PipelineError::io("list frames", dir, e))?;
        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io("list frames", dir, e))?;
            let path = entry.path();
            if is_frame_file(&path) {
                frames.push(path);
            }
        }
        // Zero padding makes lexical order equal to numeric order.
        frames.sort();
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.frames.iter().map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.frames
    }

    /// Delete every frame past `max` and keep the first `max`.
    fn cap(&mut self, max: usize) -> Result<usize, PipelineError> {
        if self.frames.len() <= max {
            return Ok(0);
        }
        let extra = self.frames.split_off(max);
        for p in &extra {
            std::fs::remove_file(p).map_err(|e| PipelineError::io("remove capped frame", p, e))?;
        }
        Ok(extra.len())
    }
}

fn is_frame_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(FRAME_PREFIX) && path.extension().is_some_and(|e| e == FRAME_EXT)
}

/// ffmpeg-backed extractor.
#[derive(Debug, Clone)]
pub(crate) struct FfmpegExtractor {
    program: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Arguments for one extraction, in the tool's expected order.
pub(crate) fn build_args(video: &Path, out_dir: &Path, params: &ExtractParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y"]
        .into_iter()
        .map(OsString::from)
        .collect();
    // -ss before -i seeks the input instead of decoding up to the offset.
    if params.start_seconds > 0.0 {
        args.push("-ss".into());
        args.push(params.start_seconds.to_string().into());
    }
    args.push("-i".into());
    args.push(video.as_os_str().to_owned());
    if params.duration_seconds > 0.0 {
        args.push("-t".into());
        args.push(params.duration_seconds.to_string().into());
    }
    args.push("-vf".into());
    args.push(format!("fps={}", params.fps).into());
    if params.max_frames > 0 {
        args.push("-frames:v".into());
        args.push(params.max_frames.to_string().into());
    }
    args.push("-q:v".into());
    args.push("2".into());
    args.push(
        out_dir
            .join(format!("{FRAME_PREFIX}%06d.{FRAME_EXT}"))
            .into_os_string(),
    );
    args
}

/// Remove frames left over from an earlier attempt so numbering restarts at 1.
fn clear_stale_frames(out_dir: &Path) -> Result<usize, PipelineError> {
    let stale = FrameSet::scan(out_dir)?;
    for p in stale.iter() {
        std::fs::remove_file(p).map_err(|e| PipelineError::io("remove stale frame", p, e))?;
    }
    Ok(stale.len())
}

impl FrameExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        video: &Path,
        out_dir: &Path,
        params: &ExtractParams,
    ) -> Result<FrameSet, PipelineError> {
        if params.fps.is_nan() || params.fps <= 0.0 {
            return Err(PipelineError::Input(format!(
                "fps must be greater than zero (got {})",
                params.fps
            )));
        }
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| PipelineError::io("create frames directory", out_dir, e))?;
        let removed = clear_stale_frames(out_dir)?;
        if removed > 0 {
            debug!(removed, dir = %out_dir.display(), "removed stale frames");
        }

        let args = build_args(video, out_dir, params);
        info!(
            program = %self.program.display(),
            args = ?args,
            "running frame extraction"
        );
        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| PipelineError::Extraction {
                reason: format!("failed to start {}: {e}", self.program.display()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(stdout = %stdout.trim(), stderr = %stderr.trim(), "frame extraction failed");
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            return Err(PipelineError::Extraction {
                reason: format!("{} exited with {code}: {}", self.program.display(), stderr.trim()),
            });
        }
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim(), "extraction tool output");
        }
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "extraction tool stderr");
        }

        let mut frames = FrameSet::scan(out_dir)?;
        if params.max_frames > 0 {
            let dropped = frames.cap(params.max_frames as usize)?;
            if dropped > 0 {
                info!(max = params.max_frames, dropped, "capped frames");
            }
        }
        if frames.is_empty() {
            return Err(PipelineError::Extraction {
                reason: format!("no frames were written to {}", out_dir.display()),
            });
        }
        info!(count = frames.len(), dir = %out_dir.display(), "frames extracted");
        Ok(frames)
    }
}
