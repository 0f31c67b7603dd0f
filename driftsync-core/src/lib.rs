//! Driftsync core library — settings, domain types, collaborator seams.
//!
//! Public API surface:
//! - [`types`] — newtypes and domain structs
//! - [`error`] — [`ConfigError`], [`RemoteError`]
//! - [`remote`] — seam traits for the mirror transfer and the queue
//! - [`settings`] — YAML settings loading and validation

pub mod error;
pub mod remote;
pub mod settings;
pub mod types;

pub use error::{ConfigError, RemoteError};
pub use remote::{Consumer, Mirror, Publisher};
pub use settings::Settings;
pub use types::{
    ActiveHours, BucketUri, CycleRecord, Direction, MirrorOutcome, MirrorRequest, QueueMessage,
    QueueUrl, RunMode, TriggerToken,
};
