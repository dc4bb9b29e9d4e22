//! `gantry status` — per-project poll visibility from the running daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gantry_daemon::{paths, request_status, DaemonError};

use super::resolve_state_root;

/// Arguments for `gantry status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "outcome")]
    outcome: String,
    #[tabled(rename = "streak")]
    streak: String,
    #[tabled(rename = "last cycle")]
    last_cycle: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let state_root = resolve_state_root(self.state_root)?;

        let payload = match request_status(&state_root) {
            Ok(payload) => payload,
            Err(DaemonError::DaemonNotRunning { socket }) => {
                let fallback = serde_json::json!({
                    "running": false,
                    "socket": socket.display().to_string(),
                });
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&fallback)?);
                } else {
                    println!(
                        "daemon is not running (socket missing: {})",
                        socket.display()
                    );
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }

        println!(
            "{} ({}) polling every {}s — socket {}",
            payload["label"].as_str().unwrap_or(paths::DAEMON_LABEL),
            payload["role"].as_str().unwrap_or("?"),
            payload["interval_secs"].as_u64().unwrap_or(0),
            payload["socket"].as_str().unwrap_or("?"),
        );

        let Some(projects) = payload["projects"].as_array() else {
            return Ok(());
        };
        if projects.is_empty() {
            println!("No projects configured.");
            return Ok(());
        }

        let rows: Vec<StatusRow> = projects
            .iter()
            .map(|project| StatusRow {
                project: project["id"].as_str().unwrap_or("?").to_owned(),
                version: project["last_version"]
                    .as_str()
                    .unwrap_or("-")
                    .to_owned(),
                outcome: colorize_outcome(project["outcome"].as_str().unwrap_or("")),
                streak: match project["failure_streak"].as_u64().unwrap_or(0) {
                    0 => "-".to_owned(),
                    n => n.to_string(),
                },
                last_cycle: format_age(project["last_cycle_at_unix"].as_u64().unwrap_or(0)),
            })
            .collect();

        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn colorize_outcome(outcome: &str) -> String {
    match outcome {
        "updated" => outcome.green().to_string(),
        "unchanged" | "no-releases" => outcome.normal().to_string(),
        "source-unavailable" => outcome.yellow().to_string(),
        "failed" | "error" => outcome.red().to_string(),
        "" => "never polled".dimmed().to_string(),
        other => other.to_owned(),
    }
}

/// Render a Unix timestamp as a coarse age ("42s ago", "3m ago", "2h ago").
fn format_age(at_unix: u64) -> String {
    if at_unix == 0 {
        return "-".to_owned();
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let elapsed = now.saturating_sub(at_unix);
    match elapsed {
        0..=59 => format!("{elapsed}s ago"),
        60..=3599 => format!("{}m ago", elapsed / 60),
        _ => format!("{}h ago", elapsed / 3600),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
