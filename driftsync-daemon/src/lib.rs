//! Daemon runtime: watcher + idle trigger + cycle processor + poll loop +
//! control socket.

mod debounce;
mod error;
pub mod log_rotation;
pub mod paths;
mod poll;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, SyncTimes};
