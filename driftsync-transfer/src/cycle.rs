//! Upload and download sync cycles.
//!
//! The two directions are deliberately asymmetric. Upload runs the guarded
//! sequence: dry-run → audit pending deletions → real transfer → publish the
//! trigger → journal record. Download mirrors straight down and records the
//! outcome; the notification it reacts to was already published by the
//! pushing replica.
//!
//! A notification is published if and only if the real upload transfer
//! succeeded. Mirror invocation failures (binary missing) are recorded as
//! cycle failures, not surfaced as errors — only the journal's own I/O can
//! make these functions fail.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use driftsync_core::types::CycleRecord;
use driftsync_core::{BucketUri, Direction, Mirror, MirrorRequest, Publisher, TriggerToken};

use crate::error::TransferError;
use crate::journal;
use crate::mirror::deletion_lines;

// ---------------------------------------------------------------------------
// Context + summary
// ---------------------------------------------------------------------------

/// Collaborators and fixed endpoints shared by every cycle of one daemon.
pub struct CycleContext {
    pub mirror: Arc<dyn Mirror>,
    pub publisher: Arc<dyn Publisher>,
    /// Local replica root.
    pub local_dir: PathBuf,
    pub bucket: BucketUri,
    /// Body published after a successful upload.
    pub trigger_token: TriggerToken,
    /// Where the activity log and deletion audits live.
    pub data_dir: PathBuf,
}

/// Outcome of one cycle, reported to whoever requested it.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub direction: Direction,
    pub success: bool,
    /// Deletion lines the dry run detected (always 0 for downloads).
    pub deletions_audited: usize,
    /// Transfer output on success, error text on failure.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Run one upload cycle: local replica → bucket.
pub async fn run_upload(ctx: &CycleContext) -> Result<CycleSummary, TransferError> {
    let started = Utc::now();
    let local = ctx.local_dir.display().to_string();

    // Dry run first: learn what the real transfer would delete remotely.
    let dry = match ctx
        .mirror
        .mirror(&MirrorRequest {
            source: local.clone(),
            dest: ctx.bucket.0.clone(),
            dry_run: true,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            return record_failure(ctx, started, Direction::Upload, err.to_string(), 0);
        }
    };
    if !dry.ok {
        let detail = format!("dry-run failed: {}", dry.stderr.trim());
        return record_failure(ctx, started, Direction::Upload, detail, 0);
    }

    let deletions = deletion_lines(&dry.stdout);
    if !deletions.is_empty() {
        // Audit trail only; a write failure must not hold up the transfer.
        match journal::write_deletion_audit(&ctx.data_dir, started, &deletions) {
            Ok(path) => tracing::info!(
                "audited {} pending deletion(s) to {}",
                deletions.len(),
                path.display()
            ),
            Err(err) => tracing::warn!("failed to write deletion audit: {err}"),
        }
    }

    let real = match ctx
        .mirror
        .mirror(&MirrorRequest {
            source: local,
            dest: ctx.bucket.0.clone(),
            dry_run: false,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            return record_failure(
                ctx,
                started,
                Direction::Upload,
                err.to_string(),
                deletions.len(),
            );
        }
    };
    if !real.ok {
        return record_failure(
            ctx,
            started,
            Direction::Upload,
            real.stderr.trim().to_owned(),
            deletions.len(),
        );
    }

    // Notify iff the real transfer succeeded. A publish failure is logged
    // and swallowed: the completed sync is not rolled back or re-announced.
    if let Err(err) = ctx.publisher.publish(&ctx.trigger_token.0).await {
        tracing::error!("failed to publish sync notification: {err}");
    }

    let detail = real.stdout.trim_end().to_owned();
    journal::append_record(
        &ctx.data_dir,
        &CycleRecord {
            at: started,
            direction: Direction::Upload,
            success: true,
            detail: detail.clone(),
        },
    )?;
    Ok(CycleSummary {
        direction: Direction::Upload,
        success: true,
        deletions_audited: deletions.len(),
        detail,
    })
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Run one download cycle: bucket → local replica.
pub async fn run_download(ctx: &CycleContext) -> Result<CycleSummary, TransferError> {
    let started = Utc::now();

    let outcome = match ctx
        .mirror
        .mirror(&MirrorRequest {
            source: ctx.bucket.0.clone(),
            dest: ctx.local_dir.display().to_string(),
            dry_run: false,
        })
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            return record_failure(ctx, started, Direction::Download, err.to_string(), 0);
        }
    };
    if !outcome.ok {
        return record_failure(
            ctx,
            started,
            Direction::Download,
            outcome.stderr.trim().to_owned(),
            0,
        );
    }

    let detail = outcome.stdout.trim_end().to_owned();
    journal::append_record(
        &ctx.data_dir,
        &CycleRecord {
            at: started,
            direction: Direction::Download,
            success: true,
            detail: detail.clone(),
        },
    )?;
    Ok(CycleSummary {
        direction: Direction::Download,
        success: true,
        deletions_audited: 0,
        detail,
    })
}

fn record_failure(
    ctx: &CycleContext,
    at: DateTime<Utc>,
    direction: Direction,
    detail: String,
    deletions_audited: usize,
) -> Result<CycleSummary, TransferError> {
    tracing::error!("{direction} sync failed: {detail}");
    journal::append_record(
        &ctx.data_dir,
        &CycleRecord {
            at,
            direction,
            success: false,
            detail: detail.clone(),
        },
    )?;
    Ok(CycleSummary {
        direction,
        success: false,
        deletions_audited,
        detail,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use driftsync_core::{MirrorOutcome, RemoteError};

    use super::*;

    struct ScriptedMirror {
        outcomes: Mutex<VecDeque<Result<MirrorOutcome, RemoteError>>>,
        calls: Mutex<Vec<MirrorRequest>>,
    }

    impl ScriptedMirror {
        fn new(outcomes: Vec<Result<MirrorOutcome, RemoteError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<MirrorRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mirror for ScriptedMirror {
        async fn mirror(&self, request: &MirrorRequest) -> Result<MirrorOutcome, RemoteError> {
            self.calls.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("mirror invoked more often than scripted")
        }
    }

    struct RecordingPublisher {
        bodies: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn new() -> Self {
            Self {
                bodies: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                bodies: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn bodies(&self) -> Vec<String> {
            self.bodies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, body: &str) -> Result<(), RemoteError> {
            if self.fail {
                return Err(RemoteError::Transport("publish refused".to_owned()));
            }
            self.bodies.lock().unwrap().push(body.to_owned());
            Ok(())
        }
    }

    fn transfer_ok(stdout: &str) -> Result<MirrorOutcome, RemoteError> {
        Ok(MirrorOutcome {
            ok: true,
            stdout: stdout.to_owned(),
            stderr: String::new(),
        })
    }

    fn transfer_failed(stderr: &str) -> Result<MirrorOutcome, RemoteError> {
        Ok(MirrorOutcome {
            ok: false,
            stdout: String::new(),
            stderr: stderr.to_owned(),
        })
    }

    fn context(
        data_dir: &TempDir,
        mirror: ScriptedMirror,
        publisher: RecordingPublisher,
    ) -> (CycleContext, Arc<ScriptedMirror>, Arc<RecordingPublisher>) {
        let mirror = Arc::new(mirror);
        let publisher = Arc::new(publisher);
        let ctx = CycleContext {
            mirror: mirror.clone(),
            publisher: publisher.clone(),
            local_dir: PathBuf::from("/srv/replica"),
            bucket: BucketUri::from("s3://team-assets"),
            trigger_token: TriggerToken::default(),
            data_dir: data_dir.path().to_path_buf(),
        };
        (ctx, mirror, publisher)
    }

    fn activity_log(data_dir: &TempDir) -> String {
        std::fs::read_to_string(journal::activity_log_path(data_dir.path())).unwrap_or_default()
    }

    #[tokio::test]
    async fn successful_upload_audits_publishes_and_records() {
        let data_dir = TempDir::new().unwrap();
        let dry = "(dryrun) upload: a.txt to s3://team-assets/a.txt\n\
                   (dryrun) delete: s3://team-assets/stale.txt\n";
        let (ctx, mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_ok(dry), transfer_ok("upload: a.txt\n")]),
            RecordingPublisher::new(),
        );

        let summary = run_upload(&ctx).await.unwrap();

        assert!(summary.success);
        assert_eq!(summary.deletions_audited, 1);
        assert_eq!(publisher.bodies(), vec!["SYNC_TRIGGER"]);
        assert_eq!(journal::audit_file_count(data_dir.path()).unwrap(), 1);
        assert!(activity_log(&data_dir).contains("upload sync completed"));

        let calls = mirror.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].dry_run && !calls[1].dry_run);
        assert_eq!(calls[0].source, "/srv/replica");
        assert_eq!(calls[0].dest, "s3://team-assets");
    }

    #[tokio::test]
    async fn dry_run_failure_skips_the_real_transfer() {
        let data_dir = TempDir::new().unwrap();
        let (ctx, mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_failed("AccessDenied")]),
            RecordingPublisher::new(),
        );

        let summary = run_upload(&ctx).await.unwrap();

        assert!(!summary.success);
        assert_eq!(mirror.calls().len(), 1, "real sync must never run");
        assert!(publisher.bodies().is_empty(), "no notification on failure");
        assert_eq!(journal::audit_file_count(data_dir.path()).unwrap(), 0);
        assert!(activity_log(&data_dir).contains("upload sync failed"));
        assert!(activity_log(&data_dir).contains("dry-run failed: AccessDenied"));
    }

    #[tokio::test]
    async fn real_transfer_failure_publishes_nothing() {
        let data_dir = TempDir::new().unwrap();
        let (ctx, mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_ok(""), transfer_failed("SlowDown")]),
            RecordingPublisher::new(),
        );

        let summary = run_upload(&ctx).await.unwrap();

        assert!(!summary.success);
        assert_eq!(mirror.calls().len(), 2);
        assert!(publisher.bodies().is_empty());
        assert!(activity_log(&data_dir).contains("SlowDown"));
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_cycle() {
        let data_dir = TempDir::new().unwrap();
        let (ctx, _mirror, _publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_ok(""), transfer_ok("upload: a.txt\n")]),
            RecordingPublisher::failing(),
        );

        let summary = run_upload(&ctx).await.unwrap();

        assert!(summary.success, "sync outcome is independent of the notification");
        assert!(activity_log(&data_dir).contains("upload sync completed"));
    }

    #[tokio::test]
    async fn mirror_spawn_error_is_recorded_as_a_failure() {
        let data_dir = TempDir::new().unwrap();
        let spawn_err = RemoteError::MirrorSpawn(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "aws not installed",
        ));
        let (ctx, _mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![Err(spawn_err)]),
            RecordingPublisher::new(),
        );

        let summary = run_upload(&ctx).await.unwrap();

        assert!(!summary.success);
        assert!(summary.detail.contains("failed to invoke mirror command"));
        assert!(publisher.bodies().is_empty());
    }

    #[tokio::test]
    async fn two_quiet_cycles_record_twice_but_audit_once() {
        let data_dir = TempDir::new().unwrap();
        let first_dry = "(dryrun) delete: s3://team-assets/stale.txt\n";
        let (ctx, _mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![
                transfer_ok(first_dry),
                transfer_ok("upload: a.txt\n"),
                // Nothing changed since: the second dry run is clean and the
                // real transfer is a no-op at the transfer layer.
                transfer_ok(""),
                transfer_ok(""),
            ]),
            RecordingPublisher::new(),
        );

        let first = run_upload(&ctx).await.unwrap();
        let second = run_upload(&ctx).await.unwrap();

        assert!(first.success && second.success);
        assert_eq!(first.deletions_audited, 1);
        assert_eq!(second.deletions_audited, 0);
        assert_eq!(journal::audit_file_count(data_dir.path()).unwrap(), 1);
        assert_eq!(
            activity_log(&data_dir).matches("upload sync completed").count(),
            2
        );
        assert_eq!(publisher.bodies().len(), 2);
    }

    #[tokio::test]
    async fn download_mirrors_bucket_to_local_and_never_publishes() {
        let data_dir = TempDir::new().unwrap();
        let (ctx, mirror, publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_ok("download: a.txt\n")]),
            RecordingPublisher::new(),
        );

        let summary = run_download(&ctx).await.unwrap();

        assert!(summary.success);
        assert!(publisher.bodies().is_empty());
        let calls = mirror.calls();
        assert_eq!(calls.len(), 1, "downloads have no dry-run pass");
        assert_eq!(calls[0].source, "s3://team-assets");
        assert_eq!(calls[0].dest, "/srv/replica");
        assert!(!calls[0].dry_run);
        assert!(activity_log(&data_dir).contains("download sync completed"));
    }

    #[tokio::test]
    async fn download_failure_is_recorded() {
        let data_dir = TempDir::new().unwrap();
        let (ctx, _mirror, _publisher) = context(
            &data_dir,
            ScriptedMirror::new(vec![transfer_failed("NoSuchBucket")]),
            RecordingPublisher::new(),
        );

        let summary = run_download(&ctx).await.unwrap();

        assert!(!summary.success);
        assert!(activity_log(&data_dir).contains("download sync failed"));
        assert!(activity_log(&data_dir).contains("NoSuchBucket"));
    }
}
