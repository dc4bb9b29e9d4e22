//! `gantry ci` — the build-host poll loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use gantry_daemon::{paths, Role, RuntimeConfig};
use gantry_pipeline::{BuildConfig, BuildPipeline, CommandNotifier};
use gantry_source::GitTagSource;

use super::{resolve_state_root, run_once};

/// Arguments for `gantry ci`.
#[derive(Args, Debug)]
pub struct CiArgs {
    /// Projects file: one Git remote URL per line.
    #[arg(long)]
    pub projects: PathBuf,

    /// Registry location (`host:port`) images are pushed to.
    #[arg(long)]
    pub registry: String,

    /// ssh destination of the runtime host (e.g. `deploy@10.0.0.2`).
    #[arg(long)]
    pub runtime_host: String,

    /// Polling interval in seconds.
    #[arg(long, default_value_t = 60)]
    pub interval: u64,

    /// Remote directory holding per-project runtime dirs.
    #[arg(long, default_value = "/srv/apps")]
    pub deploy_root: PathBuf,

    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,

    /// External notification command, invoked as `<cmd> <channel> <message>`.
    #[arg(long)]
    pub notify_cmd: Option<String>,

    /// Timeout in seconds for builds and pushes.
    #[arg(long, default_value_t = 1800)]
    pub command_timeout: u64,

    /// Run a single poll cycle and exit instead of looping.
    #[arg(long)]
    pub once: bool,
}

impl CiArgs {
    pub fn run(self) -> Result<()> {
        let state_root = resolve_state_root(self.state_root)?;

        let source = GitTagSource::new(paths::mirrors_dir(&state_root));
        let mut pipeline = BuildPipeline::new(BuildConfig {
            registry: self.registry,
            runtime_host: self.runtime_host,
            deploy_root: self.deploy_root,
            state_root: state_root.clone(),
            command_timeout: Duration::from_secs(self.command_timeout),
        });
        if let Some(cmd) = self.notify_cmd {
            pipeline = pipeline.with_notifier(CommandNotifier::new(cmd));
        }

        if self.once {
            return run_once(&state_root, &self.projects, &source, &pipeline, false);
        }

        let config = RuntimeConfig {
            role: Role::Ci,
            state_root,
            projects_file: self.projects,
            interval: Duration::from_secs(self.interval),
        };
        gantry_daemon::start_blocking(config, Arc::new(source), Arc::new(pipeline))
            .context("ci poll loop exited with error")
    }
}
