//! Daemon settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.driftsync/
//!   config.yaml     (settings — this module)
//!   activity.log    (append-only sync journal)
//!   audit/          (per-cycle deletion audit files)
//!   daemon.sock     (control socket)
//! ```
//!
//! Settings come from a YAML file, not CLI flags. The default location is
//! `<home>/.driftsync/config.yaml`; the `DRIFTSYNC_CONFIG` environment
//! variable points somewhere else entirely (tests, multiple replicas on one
//! host).
//!
//! # API pattern
//!
//! - `load_at(path)` — explicit path; used in tests with `TempDir`
//! - `load()` — resolves `DRIFTSYNC_CONFIG` / home, delegates to `load_at`
//!
//! Tests must NEVER call `load()`; always use `load_at`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ActiveHours, BucketUri, QueueUrl, RunMode, TriggerToken};

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "DRIFTSYNC_CONFIG";

/// SQS bounds long-poll waits at 20 seconds.
pub const MAX_POLL_WAIT_SECS: u64 = 20;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything a daemon instance needs, parsed from `config.yaml`.
///
/// `local_dir`, `bucket` and `queue_url` are required; everything else
/// defaults to the stock timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Local replica root: watched for changes, and the download destination.
    pub local_dir: PathBuf,

    /// Remote bucket URI, e.g. `s3://team-assets`.
    pub bucket: BucketUri,

    /// Queue carrying sync notifications between replicas.
    pub queue_url: QueueUrl,

    #[serde(default = "default_region")]
    pub region: String,

    /// Which sides this instance runs (`both`, `push`, `pull`).
    #[serde(default)]
    pub mode: RunMode,

    /// Quiet time after the last filesystem event before an upload fires.
    #[serde(default = "default_idle_window_secs")]
    pub idle_window_secs: u64,

    /// Local-hour window during which the poll loop does real work.
    #[serde(default)]
    pub active_hours: ActiveHours,

    /// Message body that triggers a download sync.
    #[serde(default)]
    pub trigger_token: TriggerToken,

    /// Long-poll receive wait (capped at the queue's 20 s bound).
    #[serde(default = "default_poll_wait_secs")]
    pub poll_wait_secs: u64,

    /// Pause between polls when a receive came back empty.
    #[serde(default = "default_idle_poll_sleep_secs")]
    pub idle_poll_sleep_secs: u64,

    /// Coarse re-check interval while outside the active-hours window.
    #[serde(default = "default_gated_sleep_secs")]
    pub gated_sleep_secs: u64,

    /// First backoff after a queue transport error; grows per consecutive
    /// error up to `backoff_cap_secs`.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Where the activity log, deletion audits, and control socket live.
    /// Defaults to `<home>/.driftsync`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_idle_window_secs() -> u64 {
    120
}

fn default_poll_wait_secs() -> u64 {
    MAX_POLL_WAIT_SECS
}

fn default_idle_poll_sleep_secs() -> u64 {
    40
}

fn default_gated_sleep_secs() -> u64 {
    300
}

fn default_backoff_base_secs() -> u64 {
    10
}

fn default_backoff_cap_secs() -> u64 {
    30
}

impl Settings {
    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_window_secs)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_secs.min(MAX_POLL_WAIT_SECS))
    }

    pub fn idle_poll_sleep(&self) -> Duration {
        Duration::from_secs(self.idle_poll_sleep_secs)
    }

    pub fn gated_sleep(&self) -> Duration {
        Duration::from_secs(self.gated_sleep_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }

    /// `data_dir` if set, otherwise `<home>/.driftsync`.
    pub fn data_dir_at(&self, home: &Path) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| driftsync_root(home))
    }

    /// Reject settings that would parse but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_dir.as_os_str().is_empty() {
            return Err(invalid("local_dir", "must not be empty"));
        }
        if !self.bucket.0.starts_with("s3://") {
            return Err(invalid("bucket", format!("`{}` must start with s3://", self.bucket)));
        }
        if self.queue_url.0.trim().is_empty() {
            return Err(invalid("queue_url", "must not be empty"));
        }
        if self.trigger_token.0.trim().is_empty() {
            return Err(invalid("trigger_token", "must not be blank"));
        }
        if self.idle_window_secs == 0 {
            return Err(invalid("idle_window_secs", "must be at least 1"));
        }
        if self.active_hours.start_hour > 23 || self.active_hours.end_hour > 23 {
            return Err(invalid("active_hours", "hours must be in 0..=23"));
        }
        if self.backoff_base_secs == 0 || self.backoff_cap_secs < self.backoff_base_secs {
            return Err(invalid("backoff", "cap must be >= base and base non-zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Paths + loading
// ---------------------------------------------------------------------------

/// `<home>/.driftsync/` — pure, no I/O.
pub fn driftsync_root(home: &Path) -> PathBuf {
    home.join(".driftsync")
}

/// `<home>/.driftsync/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    driftsync_root(home).join("config.yaml")
}

/// Load and validate settings from an explicit path.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let settings: Settings = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `DRIFTSYNC_CONFIG`, or the default location under the
/// home directory.
pub fn load() -> Result<Settings, ConfigError> {
    let path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => config_path_at(&home()?),
    };
    load_at(&path)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
