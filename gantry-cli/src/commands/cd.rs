//! `gantry cd` — the runtime-host poll loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use gantry_daemon::{Role, RuntimeConfig};
use gantry_pipeline::{CommandNotifier, DeployConfig, DeployPipeline};
use gantry_source::RegistryTagSource;

use super::{resolve_state_root, run_once};

/// Arguments for `gantry cd`.
#[derive(Args, Debug)]
pub struct CdArgs {
    /// Projects file: one image-repository name per line.
    #[arg(long)]
    pub projects: PathBuf,

    /// Registry location (`host:port`) to poll and pull from.
    #[arg(long)]
    pub registry: String,

    /// Registry username.
    #[arg(long)]
    pub username: String,

    /// Registry password; prefer setting $REGISTRY_PASSWORD over the flag.
    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Polling interval in seconds.
    #[arg(long, default_value_t = 30)]
    pub interval: u64,

    /// Directory holding per-project runtime dirs.
    #[arg(long, default_value = "/srv/apps")]
    pub deploy_root: PathBuf,

    /// Local state root (defaults to ~/.gantry).
    #[arg(long)]
    pub state_root: Option<PathBuf>,

    /// External notification command, invoked as `<cmd> <channel> <message>`.
    #[arg(long)]
    pub notify_cmd: Option<String>,

    /// Query the registry over plain HTTP (LAN registries without TLS).
    #[arg(long)]
    pub plain_http: bool,

    /// Timeout in seconds for pulls and recreates.
    #[arg(long, default_value_t = 600)]
    pub command_timeout: u64,

    /// Run a single poll cycle and exit instead of looping.
    #[arg(long)]
    pub once: bool,

    /// Show what would be redeployed (descriptor diff) without side
    /// effects; implies --once and leaves recorded state untouched.
    #[arg(long)]
    pub dry_run: bool,
}

impl CdArgs {
    pub fn run(self) -> Result<()> {
        let state_root = resolve_state_root(self.state_root)?;

        let source = RegistryTagSource::new(
            &self.registry,
            self.plain_http,
            Some((self.username.as_str(), self.password.as_str())),
        );
        let mut pipeline = DeployPipeline::new(DeployConfig {
            registry: self.registry,
            username: self.username,
            password: self.password,
            deploy_root: self.deploy_root,
            state_root: state_root.clone(),
            dry_run: self.dry_run,
            command_timeout: Duration::from_secs(self.command_timeout),
        });
        if let Some(cmd) = self.notify_cmd {
            pipeline = pipeline.with_notifier(CommandNotifier::new(cmd));
        }

        if self.once || self.dry_run {
            return run_once(&state_root, &self.projects, &source, &pipeline, self.dry_run);
        }

        let config = RuntimeConfig {
            role: Role::Cd,
            state_root,
            projects_file: self.projects,
            interval: Duration::from_secs(self.interval),
        };
        gantry_daemon::start_blocking(config, Arc::new(source), Arc::new(pipeline))
            .context("cd poll loop exited with error")
    }
}
