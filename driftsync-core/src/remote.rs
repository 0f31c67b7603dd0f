//! Seams to the external collaborators: the directory-mirroring transfer
//! and the notification queue.
//!
//! Real implementations live in `driftsync-transfer` (the `aws` CLI) and
//! `driftsync-queue` (SQS); tests substitute in-memory fakes so cycle and
//! loop behavior is checked deterministically.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::types::{MirrorOutcome, MirrorRequest, QueueMessage};

/// Mirrors one directory tree onto another (either side may be remote),
/// deleting extraneous destination files and skipping up-to-date ones by
/// timestamp.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Run one transfer. `Err` means the operation could not be invoked;
    /// a completed-but-failed transfer is `Ok` with `ok == false`.
    async fn mirror(&self, request: &MirrorRequest) -> Result<MirrorOutcome, RemoteError>;
}

/// Publishes the "a push happened" signal after a successful upload sync.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, body: &str) -> Result<(), RemoteError>;
}

/// Consumes notification messages with at-least-once semantics.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Long-poll for up to one message, waiting at most `wait`.
    async fn receive(&self, wait: Duration) -> Result<Vec<QueueMessage>, RemoteError>;

    /// Remove a delivered message so it is not redelivered.
    async fn acknowledge(&self, handle: &str) -> Result<(), RemoteError>;
}
