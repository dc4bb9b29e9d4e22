//! `gantry daemon` — control the running loop and its systemd supervision.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use gantry_daemon::paths::{stderr_log_path, stdout_log_path};
use gantry_daemon::{
    install_systemd, request_cycle, request_stop, uninstall_systemd, DaemonError,
};

use super::resolve_state_root;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Request graceful shutdown over the control socket.
    Stop(StopArgs),
    /// Trigger an immediate poll cycle and print its summary.
    Cycle(StopArgs),
    /// Install and start a systemd user unit running the given loop.
    Install(InstallArgs),
    /// Stop and remove the systemd user unit.
    Uninstall(StopArgs),
    /// Print recent daemon log lines.
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,

    /// Full gantry invocation the unit should supervise, e.g.
    /// `-- ci --projects /etc/gantry/projects --registry reg:5000 --runtime-host deploy@10.0.0.2`
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,

    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Stop(args) => {
            let state_root = resolve_state_root(args.state_root)?;
            match request_stop(&state_root) {
                Ok(()) => println!("daemon stop requested"),
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    println!("daemon is not running");
                }
                Err(err) => return Err(err).context("failed to stop daemon"),
            }
        }
        DaemonCommand::Cycle(args) => {
            let state_root = resolve_state_root(args.state_root)?;
            match request_cycle(&state_root) {
                Ok(summary) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&summary)
                            .context("failed to render cycle summary JSON")?
                    );
                }
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    bail!("daemon is not running; start it with `gantry ci` or `gantry cd`");
                }
                Err(err) => return Err(err).context("cycle request failed"),
            }
        }
        DaemonCommand::Install(args) => {
            let state_root = resolve_state_root(args.state_root)?;
            validate_loop_args(&args.args)?;
            let home = dirs::home_dir().context("could not determine home directory")?;
            let unit = install_systemd(&home, &state_root, args.args)
                .context("failed to install systemd unit")?;
            println!("installed systemd unit: {}", unit.display());
        }
        DaemonCommand::Uninstall(args) => {
            let state_root = resolve_state_root(args.state_root)?;
            let home = dirs::home_dir().context("could not determine home directory")?;
            uninstall_systemd(&home, &state_root)
                .context("failed to uninstall systemd unit")?;
            println!("removed systemd unit");
        }
        DaemonCommand::Logs(args) => {
            let state_root = resolve_state_root(args.state_root)?;
            let mut logs = vec![stderr_log_path(&state_root)];
            if !args.stderr_only {
                logs.insert(0, stdout_log_path(&state_root));
            }
            for log in logs {
                if !log.exists() {
                    continue;
                }
                println!("==> {} <==", log.display());
                for line in tail_lines(&log, args.lines)? {
                    println!("{line}");
                }
            }
        }
    }
    Ok(())
}

/// The supervised invocation must be one of the two poll loops.
fn validate_loop_args(args: &[String]) -> Result<()> {
    match args.first().map(String::as_str) {
        Some("ci") | Some("cd") => Ok(()),
        Some(other) => bail!("unit must run `ci` or `cd`, got '{other}'"),
        None => bail!("pass the loop invocation after `--`, e.g. `-- ci --projects …`"),
    }
}

fn tail_lines(path: &std::path::Path, count: usize) -> Result<Vec<String>> {
    let file =
        File::open(path).with_context(|| format!("failed to open log {}", path.display()))?;
    let mut tail = VecDeque::with_capacity(count);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read log {}", path.display()))?;
        if tail.len() == count {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_args_must_start_with_a_role() {
        assert!(validate_loop_args(&["ci".to_owned()]).is_ok());
        assert!(validate_loop_args(&["cd".to_owned(), "--once".to_owned()]).is_ok());
        assert!(validate_loop_args(&["status".to_owned()]).is_err());
        assert!(validate_loop_args(&[]).is_err());
    }

    #[test]
    fn tail_returns_only_trailing_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gantryd.log");
        let body: String = (1..=10).map(|n| format!("line-{n}\n")).collect();
        std::fs::write(&path, body).unwrap();

        let tail = tail_lines(&path, 3).unwrap();
        assert_eq!(tail, vec!["line-8", "line-9", "line-10"]);
    }
}
