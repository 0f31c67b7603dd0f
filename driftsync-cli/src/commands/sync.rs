//! `driftsync sync` — run one sync cycle immediately, without the daemon.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use driftsync_core::{settings, Mirror, MirrorRequest, Settings};
use driftsync_queue::SqsQueue;
use driftsync_transfer::cycle::{self, CycleContext};
use driftsync_transfer::mirror::deletion_lines;
use driftsync_transfer::CliMirror;

/// Arguments for `driftsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Pull from the bucket into the local directory instead of pushing.
    #[arg(long)]
    pub down: bool,

    /// Show what the transfer would change without applying anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let settings = settings::load().context("configuration error")?;
        let data_dir = settings.data_dir_at(&home);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;

        runtime.block_on(async move {
            if self.dry_run {
                return preview(&settings, self.down).await;
            }

            let queue =
                Arc::new(SqsQueue::connect(&settings.region, settings.queue_url.clone()).await);
            let ctx = CycleContext {
                mirror: Arc::new(CliMirror::new()),
                publisher: queue,
                local_dir: settings.local_dir.clone(),
                bucket: settings.bucket.clone(),
                trigger_token: settings.trigger_token.clone(),
                data_dir,
            };

            let summary = if self.down {
                cycle::run_download(&ctx).await
            } else {
                cycle::run_upload(&ctx).await
            }
            .context("sync cycle failed")?;

            if !summary.success {
                bail!("{} sync failed: {}", summary.direction, summary.detail);
            }

            if summary.deletions_audited > 0 {
                println!(
                    "{} {} sync completed ({} deletion(s) audited)",
                    "✓".green(),
                    summary.direction,
                    summary.deletions_audited
                );
            } else {
                println!("{} {} sync completed", "✓".green(), summary.direction);
            }
            if !summary.detail.is_empty() {
                println!("{}", summary.detail);
            }
            Ok(())
        })
    }
}

/// Dry-run only: print the pending transfer, highlight pending deletions.
async fn preview(settings: &Settings, down: bool) -> Result<()> {
    let local = settings.local_dir.display().to_string();
    let bucket = settings.bucket.0.clone();
    let (source, dest) = if down {
        (bucket, local)
    } else {
        (local, bucket)
    };

    let mirror = CliMirror::new();
    let outcome = mirror
        .mirror(&MirrorRequest {
            source,
            dest,
            dry_run: true,
        })
        .await
        .context("failed to invoke mirror command")?;

    if !outcome.ok {
        bail!("dry-run failed: {}", outcome.stderr.trim());
    }

    if outcome.stdout.trim().is_empty() {
        println!("{} nothing to transfer", "✓".green());
        return Ok(());
    }

    print!("{}", outcome.stdout);
    let deletions = deletion_lines(&outcome.stdout);
    if !deletions.is_empty() {
        println!(
            "{} {} deletion(s) pending — they will be audited before a real sync",
            "!".yellow(),
            deletions.len()
        );
    }
    Ok(())
}
