//! Error types for driftsync-transfer.

use std::path::PathBuf;

use thiserror::Error;

use driftsync_core::RemoteError;

/// All errors that can arise from running sync cycles.
///
/// A transfer that completed with a non-zero status is not an error at this
/// level — cycles record it and report `success == false`. These variants
/// cover the journal's filesystem and the mirror seam itself.
#[derive(Debug, Error)]
pub enum TransferError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An error from the mirror or queue seam.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Convenience constructor for [`TransferError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TransferError {
    TransferError::Io {
        path: path.into(),
        source,
    }
}
