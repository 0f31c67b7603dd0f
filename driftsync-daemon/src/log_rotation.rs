//! Size-based rotation for the activity journal.
//!
//! The journal is append-only and never truncated by the sync cycles, so a
//! busy replica would grow it without bound. Rotates `activity.log` when it
//! exceeds 10 MiB, keeping at most 5 numbered copies:
//!   activity.log → activity.log.1 → … → activity.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use driftsync_transfer::journal;

/// Maximum journal size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size exceeds `max_bytes`.
///
/// The oldest backup is dropped, the rest shift up by one, the live log
/// becomes `.1`, and a fresh empty log takes its place.
///
/// Returns `true` if rotation occurred; a missing file is a no-op.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = rotated_path(log_path, n);
        if src.exists() {
            fs::rename(&src, rotated_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, rotated_path(log_path, 1))?;

    // Recreate an empty live log so appenders always find a writable path.
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate the activity journal under `data_dir`.
///
/// Errors are logged and swallowed; rotation must never take the daemon down.
pub fn rotate_activity_log(data_dir: &Path) {
    let log_path = journal::activity_log_path(data_dir);
    match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => tracing::info!(path = %log_path.display(), "activity log rotated"),
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(path = %log_path.display(), error = %err, "activity log rotation failed")
        }
    }
}

/// Path of the `n`-th rotated copy (e.g. `activity.log.2`).
fn rotated_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(journal::ACTIVITY_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
