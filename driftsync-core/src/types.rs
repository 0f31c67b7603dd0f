//! Domain types for driftsync.
//!
//! Local filesystem paths use `PathBuf`; bucket URIs and queue URLs are
//! remote endpoints and stay string newtypes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A bucket URI in the `s3://bucket[/prefix]` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketUri(pub String);

impl fmt::Display for BucketUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BucketUri {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BucketUri {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The URL of the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(pub String);

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for QueueUrl {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for QueueUrl {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The sentinel message body announcing "a push happened, pull now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerToken(pub String);

impl TriggerToken {
    /// Whether a received message body is this trigger.
    ///
    /// Comparison trims surrounding whitespace and ignores ASCII case, so a
    /// queue that rewraps bodies (or a hand-sent `sync_trigger\n`) still
    /// triggers.
    pub fn matches(&self, body: &str) -> bool {
        body.trim().eq_ignore_ascii_case(self.0.trim())
    }
}

impl Default for TriggerToken {
    fn default() -> Self {
        Self("SYNC_TRIGGER".to_owned())
    }
}

impl fmt::Display for TriggerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Direction of a mirror transfer, relative to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// Which sides of the synchronizer one daemon instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Watch-and-upload and poll-and-download in one process.
    #[default]
    Both,
    /// Watch-and-upload only.
    Push,
    /// Poll-and-download only.
    Pull,
}

impl RunMode {
    pub fn push_enabled(self) -> bool {
        matches!(self, RunMode::Both | RunMode::Push)
    }

    pub fn pull_enabled(self) -> bool {
        matches!(self, RunMode::Both | RunMode::Pull)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Both => write!(f, "both"),
            RunMode::Push => write!(f, "push"),
            RunMode::Pull => write!(f, "pull"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Half-open local-hour window during which the poll loop does real work.
///
/// `start_hour == end_hour` means always active; `start_hour > end_hour`
/// wraps past midnight (e.g. `22..6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl ActiveHours {
    pub const ALL_DAY: ActiveHours = ActiveHours {
        start_hour: 0,
        end_hour: 0,
    };

    /// Whether the given hour-of-day (0..24) falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        let hour = (hour % 24) as u8;
        if self.start_hour == self.end_hour {
            true
        } else if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self::ALL_DAY
    }
}

/// A request handed to the mirroring collaborator.
///
/// Endpoints are strings because either side may be a local path or a
/// bucket URI, depending on direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorRequest {
    pub source: String,
    pub dest: String,
    /// Compute and report changes without applying them.
    pub dry_run: bool,
}

/// What one external mirror invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorOutcome {
    /// The external operation reported success (zero exit status).
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
}

/// A single notification pulled from the queue.
///
/// The `ack_handle` must be passed back to acknowledge (delete) the message;
/// unacknowledged messages are redelivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub ack_handle: String,
}

/// Immutable record of one sync attempt, appended to the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub at: DateTime<Utc>,
    pub direction: Direction,
    pub success: bool,
    /// Captured transfer output on success, error text on failure.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
