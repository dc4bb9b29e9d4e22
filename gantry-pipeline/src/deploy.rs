//! Runtime-host action pipeline: login → locate → audit → repoint → pull →
//! recreate.
//!
//! "Zero-downtime" is a property of the underlying `docker compose up -d`
//! recreate-in-place primitive; this pipeline only sequences
//! pull-then-recreate and treats either sub-step's failure as total
//! pipeline failure. The prior running state is appended to the per-version
//! audit log before anything is mutated.

use std::path::PathBuf;
use std::time::Duration;

use gantry_core::audit::AuditLog;
use gantry_core::exec::{self, CommandSpec, RetryPolicy};
use gantry_core::types::{Project, ProjectId};
use gantry_core::version::VersionTag;

use crate::descriptor::{self, DESCRIPTOR_FILE};
use crate::error::PipelineError;
use crate::notify::{notify_best_effort, Channel, CommandNotifier};
use crate::ActionPipeline;

/// Runtime-host pipeline configuration.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Registry location as `host:port`; prefixes every image reference.
    pub registry: String,
    /// Pass-through registry credentials; never stored, only forwarded.
    pub username: String,
    pub password: String,
    /// Directory under which each project's runtime dir lives.
    pub deploy_root: PathBuf,
    /// Local gantry state root (the audit log lives here).
    pub state_root: PathBuf,
    /// Render the descriptor diff and stop before any side effect.
    pub dry_run: bool,
    /// Timeout applied to pulls and recreates.
    pub command_timeout: Duration,
}

pub struct DeployPipeline {
    config: DeployConfig,
    notifier: Option<CommandNotifier>,
    retry: RetryPolicy,
}

impl DeployPipeline {
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            notifier: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: CommandNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn run_inner(&self, project: &Project, version: &VersionTag) -> Result<(), PipelineError> {
        tracing::info!("deploying '{}' {version}", project.id);

        // 1. Authenticate. A credential failure is a hard error; it is never
        //    retried with different credentials.
        if !self.config.dry_run {
            self.login()?;
        }

        // 2. Locate the project's runtime directory and its descriptor.
        let project_dir = self.config.deploy_root.join(project.id.as_str());
        if !project_dir.is_dir() {
            return Err(PipelineError::ProjectNotFound {
                project: project.id.to_string(),
                path: project_dir,
            });
        }
        let descriptor_path = project_dir.join(DESCRIPTOR_FILE);
        if !descriptor_path.exists() {
            return Err(PipelineError::DescriptorMissing {
                path: descriptor_path,
            });
        }

        let repository = format!("{}/{}", self.config.registry, project.id);

        if self.config.dry_run {
            let update =
                descriptor::update_file(&descriptor_path, &repository, version.image_tag(), true)?;
            if update.changed {
                tracing::info!(
                    "[dry-run] would repoint {} service(s) for '{}':\n{}",
                    update.services.len(),
                    project.id,
                    update.diff
                );
            } else {
                tracing::info!("[dry-run] descriptor for '{}' already at {version}", project.id);
            }
            return Ok(());
        }

        // 3. Audit the prior running state before mutating anything.
        self.record_audit(&project.id, version, &project_dir, &repository)?;

        // 4. Repoint the descriptor at the new tag.
        let update =
            descriptor::update_file(&descriptor_path, &repository, version.image_tag(), false)?;
        if update.changed {
            tracing::info!(
                "repointed service(s) {:?} at {repository}:{}",
                update.services,
                version.image_tag()
            );
        }

        // 5. Pull, then recreate; pull strictly first.
        let pull = CommandSpec::new("docker")
            .args(["compose", "pull", "--quiet"])
            .cwd(&project_dir)
            .timeout(self.config.command_timeout);
        self.retry
            .run(&pull)
            .map_err(|source| PipelineError::PullFailed {
                project: project.id.to_string(),
                source,
            })?;

        let up = CommandSpec::new("docker")
            .args(["compose", "up", "-d"])
            .cwd(&project_dir)
            .timeout(self.config.command_timeout);
        exec::run(&up).map_err(|source| PipelineError::RecreateFailed {
            project: project.id.to_string(),
            source,
        })?;

        tracing::info!("'{}' now running {repository}:{}", project.id, version.image_tag());
        Ok(())
    }

    fn login(&self) -> Result<(), PipelineError> {
        let login = CommandSpec::new("docker")
            .args(["login", &self.config.registry])
            .args(["--username", &self.config.username])
            .arg("--password-stdin")
            .stdin(self.config.password.clone())
            .timeout(Duration::from_secs(30));
        exec::run(&login).map_err(|source| PipelineError::AuthFailed {
            registry: self.config.registry.clone(),
            source,
        })?;
        Ok(())
    }

    /// Append what is currently running to the per-version audit log. The
    /// snapshot command may fail (nothing running yet) — that is itself
    /// worth recording, not a pipeline failure.
    fn record_audit(
        &self,
        project: &ProjectId,
        version: &VersionTag,
        project_dir: &std::path::Path,
        repository: &str,
    ) -> Result<(), PipelineError> {
        let snapshot = CommandSpec::new("docker")
            .args(["compose", "ps"])
            .cwd(project_dir)
            .timeout(Duration::from_secs(30));
        let prior = match exec::run(&snapshot) {
            Ok(output) if !output.stdout.trim().is_empty() => output.stdout,
            Ok(_) => "(no running service)".to_owned(),
            Err(err) => format!("(snapshot unavailable: {err})"),
        };

        let audit = AuditLog::new(self.config.state_root.join("audit"));
        audit.append(
            project,
            version,
            &format!("replacing with {repository}:{}\n{prior}", version.image_tag()),
        )?;
        Ok(())
    }

    fn announce(&self, project: &ProjectId, version: &VersionTag, result: &Result<(), PipelineError>) {
        let message = match result {
            Ok(()) => format!("deployed {project} {version}"),
            Err(err) => format!("deploy failed for {project} {version}: {err}"),
        };
        notify_best_effort(self.notifier.as_ref(), Channel::Chat, &message);
    }
}

impl ActionPipeline for DeployPipeline {
    fn run(&self, project: &Project, version: &VersionTag) -> Result<(), PipelineError> {
        let result = self.run_inner(project, version);
        if let Err(err) = &result {
            tracing::error!("deploy pipeline for '{}' {version} failed: {err}", project.id);
        }
        if !self.config.dry_run {
            self.announce(&project.id, version, &result);
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
