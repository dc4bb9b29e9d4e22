//! Append-only deployment audit log.
//!
//! One log file per (project, version) at `<dir>/<project>/<version>.log`.
//! The deploy pipeline appends the prior running container/image state
//! before mutating anything, so a human can see what was replaced even if
//! the orchestration step fails silently afterwards.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;

use crate::error::{state_io_err, StateError};
use crate::types::ProjectId;
use crate::version::VersionTag;

#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<project>/<version>.log` — pure, no I/O.
    pub fn log_path(&self, project: &ProjectId, version: &VersionTag) -> PathBuf {
        self.dir.join(project.as_str()).join(format!("{version}.log"))
    }

    /// Append a timestamped entry. Never truncates: repeated deploy attempts
    /// for the same version accumulate in the same file.
    pub fn append(
        &self,
        project: &ProjectId,
        version: &VersionTag,
        entry: &str,
    ) -> Result<PathBuf, StateError> {
        let path = self.log_path(project, version);
        let parent = path.parent().expect("audit log path has a parent");
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| state_io_err(parent, e))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| state_io_err(&path, e))?;
        writeln!(file, "=== {} ===", Utc::now().to_rfc3339()).map_err(|e| state_io_err(&path, e))?;
        writeln!(file, "{}", entry.trim_end()).map_err(|e| state_io_err(&path, e))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn v(raw: &str) -> VersionTag {
        VersionTag::parse(raw).expect(raw)
    }

    #[test]
    fn append_creates_per_version_file() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path());
        let path = log
            .append(&ProjectId::from("demo"), &v("v1.0.0"), "image: demo:0.9.0")
            .unwrap();
        assert!(path.ends_with("demo/v1.0.0.log"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("image: demo:0.9.0"));
    }

    #[test]
    fn append_never_truncates() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path());
        let project = ProjectId::from("demo");
        log.append(&project, &v("v1.0.0"), "first attempt").unwrap();
        log.append(&project, &v("v1.0.0"), "second attempt").unwrap();
        let contents = std::fs::read_to_string(log.log_path(&project, &v("v1.0.0"))).unwrap();
        assert!(contents.contains("first attempt"));
        assert!(contents.contains("second attempt"));
    }

    #[test]
    fn versions_get_distinct_files() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path());
        let project = ProjectId::from("demo");
        log.append(&project, &v("v1.0.0"), "a").unwrap();
        log.append(&project, &v("v1.1.0"), "b").unwrap();
        assert!(log.log_path(&project, &v("v1.0.0")).exists());
        assert!(log.log_path(&project, &v("v1.1.0")).exists());
    }
}
