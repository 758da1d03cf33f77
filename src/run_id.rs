//! Run identifiers: `run_<date>_<time>_<millis>_<content hash>`.

use crate::error::PipelineError;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use time::macros::format_description;
use time::OffsetDateTime;

const HASH_PREFIX_LEN: usize = 10;
const READ_CHUNK: usize = 1024 * 1024;

/// Build a run id from `now` and the video's content hash.
///
/// The timestamp is fixed-width so ids sort lexically by creation time.
pub(crate) fn generate(video: &Path, now: OffsetDateTime) -> Result<String, PipelineError> {
    let hash = hash_file(video)?;
    let stamp = now
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]_[subsecond digits:3]"
        ))
        .map_err(|e| PipelineError::Input(format!("format run timestamp: {e}")))?;
    Ok(format!("run_{stamp}_{}", &hash[..HASH_PREFIX_LEN]))
}

/// Current local time, falling back to UTC when the offset is unknown.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Hex SHA-256 of the file contents.
pub(crate) fn hash_file(path: &Path) -> Result<String, PipelineError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        PipelineError::Input(format!("cannot read video {}: {e}", path.display()))
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            PipelineError::Input(format!("cannot read video {}: {e}", path.display()))
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check a user-supplied run id is usable as a single directory name.
pub(crate) fn validate(run_id: &str) -> Result<(), PipelineError> {
    let ok = !run_id.is_empty()
        && run_id != "."
        && run_id != ".."
        && !run_id.contains(['/', '\\'])
        && !run_id.chars().any(char::is_control);
    if ok {
        Ok(())
    } else {
        Err(PipelineError::Input(format!("invalid run id {run_id:?}")))
    }
}
