//! Canonical layout of the gantry state root.
//!
//! ```text
//! <state root>/              (default ~/.gantry)
//!   state/<project>.json     last successfully processed version
//!   mirrors/<project>.git    bare Git mirrors (build host)
//!   work/<project>/          ephemeral build workspaces (build host)
//!   sync/<project>.json      config sync ledger (build host)
//!   audit/<project>/<v>.log  pre-deploy audit entries (runtime host)
//!   run/gantryd.sock         control socket
//!   logs/gantryd.log         daemon logs (+ gantryd-err.log)
//! ```
//!
//! The state/work/sync/audit subdirectories are owned by the crates that
//! write them; this module is the single place that names them all.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_LABEL: &str = "gantryd";
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const DAEMON_STDOUT_LOG: &str = "gantryd.log";
pub const DAEMON_STDERR_LOG: &str = "gantryd-err.log";
pub const DAEMON_SOCKET: &str = "gantryd.sock";

/// `~/.gantry` for the current user, if a home directory exists.
pub fn default_state_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gantry"))
}

pub fn state_dir(root: &Path) -> PathBuf {
    root.join("state")
}

pub fn mirrors_dir(root: &Path) -> PathBuf {
    root.join("mirrors")
}

pub fn run_dir(root: &Path) -> PathBuf {
    root.join("run")
}

pub fn socket_path(root: &Path) -> PathBuf {
    run_dir(root).join(DAEMON_SOCKET)
}

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

pub fn stdout_log_path(root: &Path) -> PathBuf {
    logs_dir(root).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(root: &Path) -> PathBuf {
    logs_dir(root).join(DAEMON_STDERR_LOG)
}

/// `~/.config/systemd/user/gantryd.service`.
pub fn systemd_unit_path(home: &Path) -> PathBuf {
    home.join(".config")
        .join("systemd")
        .join("user")
        .join(format!("{DAEMON_LABEL}.service"))
}
