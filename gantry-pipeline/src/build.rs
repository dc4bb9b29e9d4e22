//! Build-host action pipeline: clone → manifest → build → push → sync.
//!
//! Steps are ordered hard gates and must not be reordered: config/secrets
//! reach the runtime host only after a successful push, so the runtime
//! host never points at an image that is not yet in the registry.

use std::path::PathBuf;
use std::time::Duration;

use gantry_core::exec::{CommandSpec, RetryPolicy};
use gantry_core::manifest;
use gantry_core::types::{Project, ProjectId};
use gantry_core::version::VersionTag;

use crate::error::PipelineError;
use crate::notify::{notify_best_effort, Channel, CommandNotifier};
use crate::sync_config;
use crate::workspace::Workspace;
use crate::ActionPipeline;

/// Build-host pipeline configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Registry location as `host:port`; prefixes every built image ref.
    pub registry: String,
    /// ssh destination of the runtime host (e.g. `deploy@10.0.0.2`).
    pub runtime_host: String,
    /// Remote directory under which each project's runtime dir lives.
    pub deploy_root: PathBuf,
    /// Local gantry state root (workspaces and the sync ledger live here).
    pub state_root: PathBuf,
    /// Timeout applied to builds and pushes; clones use a shorter one.
    pub command_timeout: Duration,
}

impl BuildConfig {
    fn work_dir(&self) -> PathBuf {
        self.state_root.join("work")
    }

    fn sync_dir(&self) -> PathBuf {
        self.state_root.join("sync")
    }
}

pub struct BuildPipeline {
    config: BuildConfig,
    notifier: Option<CommandNotifier>,
    retry: RetryPolicy,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
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
        tracing::info!("building '{}' {version}", project.id);

        // 1. Fresh checkout of the exact tagged revision.
        let workspace = Workspace::acquire(&self.config.work_dir(), &project.id)?;
        self.checkout(project, version, &workspace)?;

        // 2. Canonical name from the manifest.
        let manifest = manifest::load_manifest(&workspace.src_dir())?;
        let image = format!(
            "{}/{}:{}",
            self.config.registry,
            manifest.project_name,
            version.image_tag()
        );

        // 3–4. Build, then push.
        self.build_image(&image, &workspace)?;
        self.push_image(&image)?;

        // 5. Ship config/secrets only after the image is in the registry.
        let outcome = sync_config::sync_project(
            &self.config.runtime_host,
            &self.config.deploy_root,
            &manifest.project_name,
            &workspace.src_dir(),
            &self.config.sync_dir(),
            &project.id,
            self.config.command_timeout,
            &self.retry,
        )?;

        tracing::info!(
            "published {image} ({} config file(s) shipped, {} unchanged)",
            outcome.shipped,
            outcome.unchanged
        );
        Ok(())
        // Workspace dropped here: checkout removed on success and failure alike.
    }

    fn checkout(
        &self,
        project: &Project,
        version: &VersionTag,
        workspace: &Workspace,
    ) -> Result<(), PipelineError> {
        let clone = CommandSpec::new("git")
            .args(["clone", "--quiet", "--depth", "1", "--branch"])
            .arg(version.as_str())
            .arg(&project.source)
            .arg(workspace.src_dir().display().to_string())
            .timeout(Duration::from_secs(120));
        self.retry
            .run(&clone)
            .map_err(|source| PipelineError::CheckoutFailed {
                reference: format!("{}@{version}", project.source),
                source,
            })?;
        Ok(())
    }

    fn build_image(&self, image: &str, workspace: &Workspace) -> Result<(), PipelineError> {
        let build = CommandSpec::new("docker")
            .args(["build", "-t", image])
            .arg(workspace.src_dir().display().to_string())
            .timeout(self.config.command_timeout);
        // Builds are local; a failure is deterministic, so no retry.
        gantry_core::exec::run(&build).map_err(|source| PipelineError::BuildFailed {
            image: image.to_owned(),
            source,
        })?;
        Ok(())
    }

    fn push_image(&self, image: &str) -> Result<(), PipelineError> {
        let push = CommandSpec::new("docker")
            .args(["push", image])
            .timeout(self.config.command_timeout);
        self.retry
            .run(&push)
            .map_err(|source| PipelineError::PushFailed {
                image: image.to_owned(),
                source,
            })?;
        Ok(())
    }

    fn announce(&self, project: &ProjectId, version: &VersionTag, result: &Result<(), PipelineError>) {
        let message = match result {
            Ok(()) => format!("built and published {project} {version}"),
            Err(err) => format!("build pipeline failed for {project} {version}: {err}"),
        };
        notify_best_effort(self.notifier.as_ref(), Channel::Chat, &message);
    }
}

impl ActionPipeline for BuildPipeline {
    fn run(&self, project: &Project, version: &VersionTag) -> Result<(), PipelineError> {
        let result = self.run_inner(project, version);
        if let Err(err) = &result {
            tracing::error!("build pipeline for '{}' {version} failed: {err}", project.id);
        }
        self.announce(&project.id, version, &result);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn config(state_root: &TempDir) -> BuildConfig {
        BuildConfig {
            registry: "registry.example.com:5000".to_owned(),
            runtime_host: "deploy@runtime".to_owned(),
            deploy_root: PathBuf::from("/srv/apps"),
            state_root: state_root.path().to_path_buf(),
            command_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn failed_checkout_aborts_and_releases_the_workspace() {
        let state_root = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(config(&state_root));
        let missing = state_root.path().join("no-such-repo");
        let project = Project::new("demo", missing.display().to_string());
        let version = VersionTag::parse("v1.0.0").unwrap();

        let err = pipeline.run(&project, &version).unwrap_err();
        assert!(matches!(err, PipelineError::CheckoutFailed { .. }));
        assert!(
            !state_root.path().join("work").join("demo").exists(),
            "workspace must be released on the failure path"
        );
    }

    #[test]
    fn notifier_failure_does_not_override_pipeline_result() {
        let state_root = TempDir::new().unwrap();
        let pipeline = BuildPipeline::new(config(&state_root))
            .with_notifier(CommandNotifier::new("gantry-no-such-notifier"));
        let missing = state_root.path().join("no-such-repo");
        let project = Project::new("demo", missing.display().to_string());
        let version = VersionTag::parse("v1.0.0").unwrap();

        // Still the pipeline's own error, not a notification error.
        let err = pipeline.run(&project, &version).unwrap_err();
        assert!(matches!(err, PipelineError::CheckoutFailed { .. }));
    }

    #[test]
    fn state_root_subdirectories_are_stable() {
        let state_root = TempDir::new().unwrap();
        let cfg = config(&state_root);
        assert!(cfg.work_dir().ends_with("work"));
        assert!(cfg.sync_dir().ends_with("sync"));
    }
}
