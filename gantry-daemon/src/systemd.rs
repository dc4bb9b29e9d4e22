//! systemd user-unit management.
//!
//! Gantry's poll loops are intentionally supervised daemons: the unit runs
//! `gantry ci`/`gantry cd` in the foreground with `Restart=always`, so a
//! crash anywhere is recovered by the supervisor at the next restart —
//! safe, because state only mutates at pipeline-success boundaries.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, systemd_unit_path, DAEMON_LABEL};

/// Generate the unit file contents for a poll-loop invocation.
pub fn generate_unit(binary_path: &Path, args: &[String]) -> String {
    let exec_start = std::iter::once(binary_path.display().to_string())
        .chain(args.iter().map(|arg| quote_arg(arg)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "[Unit]\n\
         Description=Gantry pull-based CI/CD poll loop\n\
         After=network-online.target\n\
         \n\
         [Service]\n\
         ExecStart={exec_start}\n\
         Restart=always\n\
         RestartSec=5\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    )
}

/// Write the unit file and enable it for the current user.
pub fn install(
    home: &Path,
    state_root: &Path,
    args: Vec<String>,
) -> Result<PathBuf, DaemonError> {
    ensure_linux()?;

    let unit = systemd_unit_path(home);
    let unit_dir = unit.parent().expect("unit path has a parent");
    if !unit_dir.exists() {
        fs::create_dir_all(unit_dir).map_err(|e| io_err(unit_dir, e))?;
    }

    let binary_path = std::env::current_exe().map_err(|e| io_err("current_exe", e))?;
    fs::write(&unit, generate_unit(&binary_path, &args)).map_err(|e| io_err(&unit, e))?;

    run_systemctl(&["daemon-reload"], false)?;
    run_systemctl(&["enable", "--now", &format!("{DAEMON_LABEL}.service")], false)?;

    // A stale socket from a previous run would confuse the fresh daemon.
    let socket = socket_path(state_root);
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }

    Ok(unit)
}

/// Disable the service and remove the unit file.
pub fn uninstall(home: &Path, state_root: &Path) -> Result<(), DaemonError> {
    ensure_linux()?;

    let unit = systemd_unit_path(home);
    if unit.exists() {
        let _ = run_systemctl(&["disable", "--now", &format!("{DAEMON_LABEL}.service")], true);
        fs::remove_file(&unit).map_err(|e| io_err(&unit, e))?;
        run_systemctl(&["daemon-reload"], true)?;
    }

    let socket = socket_path(state_root);
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn ensure_linux() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_linux() -> Result<(), DaemonError> {
    Err(DaemonError::Systemd(
        "systemd management is only supported on Linux".to_string(),
    ))
}

fn run_systemctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Systemd(format!(
        "systemctl --user {} failed (status {}): {} {}",
        args.join(" "),
        output.status,
        stdout,
        stderr
    )))
}

fn quote_arg(arg: &str) -> String {
    if arg.contains(char::is_whitespace) {
        format!("\"{arg}\"")
    } else {
        arg.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_supervises_with_restart_always() {
        let unit = generate_unit(
            Path::new("/usr/local/bin/gantry"),
            &["ci".to_owned(), "--projects".to_owned(), "/etc/gantry/projects".to_owned()],
        );
        assert!(unit.contains("Restart=always"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/gantry ci --projects /etc/gantry/projects"
        ));
        assert!(unit.contains("WantedBy=default.target"));
    }

    #[test]
    fn arguments_with_spaces_are_quoted() {
        let unit = generate_unit(
            Path::new("/usr/local/bin/gantry"),
            &["cd".to_owned(), "--notify-cmd".to_owned(), "notify send".to_owned()],
        );
        assert!(unit.contains("--notify-cmd \"notify send\""));
    }

    #[test]
    fn unit_path_is_under_user_systemd_config() {
        let path = systemd_unit_path(Path::new("/home/deploy"));
        assert_eq!(
            path,
            PathBuf::from("/home/deploy/.config/systemd/user/gantryd.service")
        );
    }
}
