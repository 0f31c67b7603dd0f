//! Append-only activity journal and per-cycle deletion audits.
//!
//! Two kinds of persisted state, both plain text:
//!
//! - `activity.log` — one entry per sync attempt, success or failure,
//!   appended and never rewritten (rotation is the daemon's concern);
//! - `audit/deleted_<timestamp>.txt` — written before a real upload whenever
//!   the dry run detected deletions, one deleted path per line.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use driftsync_core::types::CycleRecord;

use crate::error::{io_err, TransferError};

pub const ACTIVITY_LOG: &str = "activity.log";
pub const AUDIT_DIR: &str = "audit";

/// Timestamp layout used in audit file names (filesystem-safe).
const AUDIT_STAMP: &str = "%Y-%m-%d_%H-%M-%S";

pub fn activity_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(ACTIVITY_LOG)
}

pub fn audit_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(AUDIT_DIR)
}

/// Append one record to the activity log, creating the log on first use.
pub fn append_record(data_dir: &Path, record: &CycleRecord) -> Result<(), TransferError> {
    let path = activity_log_path(data_dir);
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir).map_err(|e| io_err(data_dir, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    writeln!(file, "{}", render_record(record)).map_err(|e| io_err(&path, e))?;
    Ok(())
}

fn render_record(record: &CycleRecord) -> String {
    let verdict = if record.success { "completed" } else { "failed" };
    let mut entry = format!(
        "[{}] {} sync {}",
        record.at.format("%Y-%m-%dT%H:%M:%SZ"),
        record.direction,
        verdict
    );
    let detail = record.detail.trim_end();
    if !detail.is_empty() {
        entry.push('\n');
        entry.push_str(detail);
    }
    entry
}

/// Persist the deletion lines from one cycle's dry run.
///
/// Returns the path of the freshly written audit file.
pub fn write_deletion_audit(
    data_dir: &Path,
    at: DateTime<Utc>,
    lines: &[String],
) -> Result<PathBuf, TransferError> {
    let dir = audit_dir(data_dir);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = dir.join(format!("deleted_{}.txt", at.format(AUDIT_STAMP)));
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Number of audit files currently on disk.
pub fn audit_file_count(data_dir: &Path) -> Result<usize, TransferError> {
    let dir = audit_dir(data_dir);
    if !dir.exists() {
        return Ok(0);
    }
    let entries = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
    Ok(entries.filter_map(|entry| entry.ok()).count())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
