//! Filesystem locations inside the daemon data directory.
//!
//! The data directory itself comes from [`driftsync_core::Settings`]
//! (default `~/.driftsync`); everything the daemon persists lives under it.

use std::path::{Path, PathBuf};

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn socket_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DAEMON_SOCKET)
}
