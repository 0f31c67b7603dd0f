//! # driftsync-transfer
//!
//! The sync cycles and their collaborators on the transfer side.
//!
//! [`cycle::run_upload`] performs the guarded upload sequence (dry-run →
//! deletion audit → real transfer → notification → journal record);
//! [`cycle::run_download`] is the simpler pull direction. Both delegate the
//! actual mirroring to the external `aws s3 sync` CLI via [`mirror::CliMirror`].

pub mod cycle;
pub mod error;
pub mod journal;
pub mod mirror;

pub use cycle::{CycleContext, CycleSummary};
pub use error::TransferError;
pub use mirror::CliMirror;
