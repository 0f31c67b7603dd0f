//! Error types for driftsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from settings loading and validation.
///
/// Any of these is fatal at startup: the process must exit non-zero before
/// entering either sync loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The settings file did not exist at the expected path.
    #[error("settings not found at {path}; create it or point DRIFTSYNC_CONFIG at it")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.driftsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// A setting was present but unusable.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors surfaced by the external collaborators behind the [`crate::remote`]
/// seams.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The mirror command could not be started at all (binary missing,
    /// permissions). A started-but-failed transfer is not an error here; it
    /// comes back as a non-ok [`crate::types::MirrorOutcome`].
    #[error("failed to invoke mirror command: {0}")]
    MirrorSpawn(#[source] std::io::Error),

    /// The queue transport failed (receive, publish, or acknowledge).
    #[error("queue transport error: {0}")]
    Transport(String),
}
