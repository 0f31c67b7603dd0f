//! External mirroring collaborator: the `aws s3 sync` CLI.
//!
//! The CLI already implements everything the cycles need — recursive sync,
//! delete-of-extraneous-files, timestamp-based skip, and a dry-run mode that
//! prints one line per pending change — so this module only invokes it and
//! captures its output.

use async_trait::async_trait;
use tokio::process::Command;

use driftsync_core::{Mirror, MirrorOutcome, MirrorRequest, RemoteError};

/// Prefix the CLI prints for files the transfer would remove at the
/// destination, e.g. `(dryrun) delete: s3://bucket/stale.txt`.
const DELETE_MARKER: &str = "delete:";

/// Mirrors directories by shelling out to `aws s3 sync`.
#[derive(Debug, Clone)]
pub struct CliMirror {
    program: String,
}

impl CliMirror {
    pub fn new() -> Self {
        Self::with_program("aws")
    }

    /// Override the executable; tests point this at stub programs.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CliMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mirror for CliMirror {
    async fn mirror(&self, request: &MirrorRequest) -> Result<MirrorOutcome, RemoteError> {
        let mut command = Command::new(&self.program);
        command
            .arg("s3")
            .arg("sync")
            .arg(&request.source)
            .arg(&request.dest)
            .arg("--delete")
            .arg("--exact-timestamps");
        if request.dry_run {
            command.arg("--dryrun");
        }

        tracing::debug!(
            "mirror: {} -> {} (dry_run={})",
            request.source,
            request.dest,
            request.dry_run
        );

        let output = command.output().await.map_err(RemoteError::MirrorSpawn)?;
        Ok(MirrorOutcome {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Extract the deletion lines from a dry-run transcript.
pub fn deletion_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.contains(DELETE_MARKER))
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
