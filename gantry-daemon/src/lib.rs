//! Gantry daemon runtime: poll loop + projects-file watcher + control socket.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod poll;
pub mod protocol;
mod runtime;
pub mod systemd;

pub use error::DaemonError;
pub use poll::{run_cycle, CycleOutcome, CycleStatus};
pub use protocol::{
    request_cycle, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, Role, RuntimeConfig};
pub use systemd::{generate_unit, install as install_systemd, uninstall as uninstall_systemd};
