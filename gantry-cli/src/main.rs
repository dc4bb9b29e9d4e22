//! Gantry — pull-based CI/CD poll loops.
//!
//! # Usage
//!
//! ```text
//! gantry ci --projects <file> --registry <host:port> --runtime-host <host> [--interval <secs>] [--once]
//! gantry cd --projects <file> --registry <host:port> --username <user> [--interval <secs>] [--once] [--dry-run]
//! gantry projects list --projects <file>
//! gantry status [--json]
//! gantry daemon stop|cycle|install|uninstall|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    cd::CdArgs, ci::CiArgs, daemon::DaemonCommand, projects::ProjectsCommand, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gantry",
    version,
    about = "Poll Git tags and a private registry; build, push, and redeploy on change",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the build-host poll loop (Git tags → build, push, sync).
    Ci(CiArgs),

    /// Run the runtime-host poll loop (registry tags → pull, redeploy).
    Cd(CdArgs),

    /// Inspect the projects file.
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },

    /// Show per-project poll status from the running daemon.
    Status(StatusArgs),

    /// Manage the running daemon and its systemd supervision.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Ci(args) => args.run(),
        Commands::Cd(args) => args.run(),
        Commands::Projects { command } => commands::projects::run(command),
        Commands::Status(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
