//! Git-backed tag source.
//!
//! Keeps one bare mirror per project under `<mirrors_dir>/<project>.git`,
//! refreshed with `git fetch` before every read. The mirror is purely a
//! performance optimization: a missing or corrupt mirror is discarded and
//! recloned, costing a round trip but never correctness.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gantry_core::exec::{CommandSpec, RetryPolicy};
use gantry_core::types::{Project, ProjectId};
use gantry_core::version::VersionTag;

use crate::{unavailable, SourceError, TagSource};

#[derive(Debug, Clone)]
pub struct GitTagSource {
    mirrors_dir: PathBuf,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GitTagSource {
    pub fn new(mirrors_dir: impl Into<PathBuf>) -> Self {
        Self {
            mirrors_dir: mirrors_dir.into(),
            timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<mirrors_dir>/<project>.git` — pure, no I/O.
    pub fn mirror_path(&self, project: &ProjectId) -> PathBuf {
        self.mirrors_dir.join(format!("{project}.git"))
    }

    /// Clone or refresh the mirror so its tag refs match the remote.
    fn refresh_mirror(&self, project: &Project) -> Result<PathBuf, SourceError> {
        let mirror = self.mirror_path(&project.id);

        if mirror.exists() && !self.mirror_is_valid(&mirror) {
            tracing::warn!(
                "discarding corrupt mirror for '{}' at {}",
                project.id,
                mirror.display()
            );
            std::fs::remove_dir_all(&mirror).map_err(|source| SourceError::Io {
                path: mirror.clone(),
                source,
            })?;
        }

        if !mirror.exists() {
            self.clone_mirror(project, &mirror)?;
            return Ok(mirror);
        }

        let fetch = CommandSpec::new("git")
            .arg("--git-dir")
            .arg(mirror.display().to_string())
            .args(["fetch", "--quiet", "--prune", "--prune-tags", "--tags"])
            .timeout(self.timeout);
        self.retry
            .run(&fetch)
            .map_err(|err| unavailable(project, err.to_string()))?;
        Ok(mirror)
    }

    fn clone_mirror(&self, project: &Project, mirror: &Path) -> Result<(), SourceError> {
        if !self.mirrors_dir.exists() {
            std::fs::create_dir_all(&self.mirrors_dir).map_err(|source| SourceError::Io {
                path: self.mirrors_dir.clone(),
                source,
            })?;
        }
        let clone = CommandSpec::new("git")
            .args(["clone", "--quiet", "--mirror"])
            .arg(&project.source)
            .arg(mirror.display().to_string())
            .timeout(self.timeout);
        self.retry
            .run(&clone)
            .map_err(|err| unavailable(project, err.to_string()))?;
        Ok(())
    }

    fn mirror_is_valid(&self, mirror: &Path) -> bool {
        let check = CommandSpec::new("git")
            .arg("--git-dir")
            .arg(mirror.display().to_string())
            .args(["rev-parse", "--git-dir"])
            .timeout(Duration::from_secs(10));
        gantry_core::exec::run(&check).is_ok()
    }
}

impl TagSource for GitTagSource {
    fn latest(&self, project: &Project) -> Result<Option<VersionTag>, SourceError> {
        let mirror = self.refresh_mirror(project)?;

        let list = CommandSpec::new("git")
            .arg("--git-dir")
            .arg(mirror.display().to_string())
            .args(["tag", "--list"])
            .timeout(Duration::from_secs(30));
        let output =
            gantry_core::exec::run(&list).map_err(|err| unavailable(project, err.to_string()))?;

        Ok(VersionTag::latest_of(output.stdout.lines().map(str::trim)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_path_is_per_project() {
        let source = GitTagSource::new("/var/lib/gantry/mirrors");
        assert_eq!(
            source.mirror_path(&ProjectId::from("shop-api")),
            PathBuf::from("/var/lib/gantry/mirrors/shop-api.git")
        );
    }

    #[test]
    fn unreachable_remote_is_source_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = GitTagSource::new(dir.path()).with_timeout(Duration::from_secs(5));
        // RetryPolicy::default() backs off briefly between the attempts.
        let project = Project::new("ghost", dir.path().join("no-such-repo").display().to_string());
        let err = source.latest(&project).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
