//! Scoped ephemeral build workspace.
//!
//! The build pipeline checks each tagged revision out into
//! `<work_root>/<project>`. Acquisition discards any stale contents from a
//! previous run, and the handle removes the directory again when dropped,
//! on success and failure paths alike — repeated runs never accumulate
//! disk usage and no step ever sees another run's files.

use std::path::{Path, PathBuf};

use gantry_core::types::ProjectId;

use crate::error::{io_err, PipelineError};

#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace for `project`, discarding any leftover one.
    pub fn acquire(work_root: &Path, project: &ProjectId) -> Result<Self, PipelineError> {
        let path = work_root.join(project.as_str());
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
        }
        std::fs::create_dir_all(&path).map_err(|e| io_err(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checkout target inside the workspace; the clone creates it.
    pub fn src_dir(&self) -> PathBuf {
        self.path.join("src")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Guaranteed-release: best-effort removal on every exit path.
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn acquire_discards_stale_contents() {
        let root = TempDir::new().unwrap();
        let stale = root.path().join("demo").join("leftover.txt");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "from a previous run").unwrap();

        let ws = Workspace::acquire(root.path(), &ProjectId::from("demo")).unwrap();
        assert!(ws.path().exists());
        assert!(!stale.exists(), "stale files must be discarded on acquire");
    }

    #[test]
    fn drop_removes_the_workspace() {
        let root = TempDir::new().unwrap();
        let path = {
            let ws = Workspace::acquire(root.path(), &ProjectId::from("demo")).unwrap();
            std::fs::write(ws.path().join("artifact"), "x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists(), "workspace must be released on drop");
    }

    #[test]
    fn src_dir_is_inside_the_workspace() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::acquire(root.path(), &ProjectId::from("demo")).unwrap();
        assert!(ws.src_dir().starts_with(ws.path()));
    }
}
