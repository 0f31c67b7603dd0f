//! driftsync — keep a local directory and an object-storage bucket mirrored.
//!
//! # Usage
//!
//! ```text
//! driftsync sync [--down] [--dry-run]
//! driftsync daemon start|stop|status|sync|logs
//! ```
//!
//! Configuration lives in `~/.driftsync/config.yaml` (or wherever
//! `DRIFTSYNC_CONFIG` points), not in CLI flags.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, sync::SyncArgs};

#[derive(Parser, Debug)]
#[command(
    name = "driftsync",
    version,
    about = "Bidirectional file ↔ object-storage synchronizer",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one sync cycle immediately (upload unless --down).
    Sync(SyncArgs),

    /// Manage the background daemon over its control socket.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
