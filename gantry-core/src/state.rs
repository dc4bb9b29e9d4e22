//! Processed-state store — the last successfully handled version per project.
//!
//! Persists one JSON record per project at `<dir>/<project>.json`. Writes
//! use the same atomic `.tmp` + rename pattern as the sync ledger, so a
//! concurrent reader never observes a partially written record and a crash
//! between pipeline completion and [`StateStore::set`] leaves the prior
//! value in place (the next poll cycle re-runs the pipeline for the same
//! target version).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{state_io_err, StateError};
use crate::types::ProjectId;
use crate::version::VersionTag;

/// Durable mapping from project to last successfully processed version.
///
/// The core correctness contract: `set` is called if-and-only-if the entire
/// action pipeline for that version succeeded.
pub trait StateStore {
    fn get(&self, project: &ProjectId) -> Result<Option<VersionTag>, StateError>;
    fn set(&mut self, project: &ProjectId, version: &VersionTag) -> Result<(), StateError>;
}

/// On-disk record payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StateRecord {
    project: ProjectId,
    last_version: Option<VersionTag>,
    updated_at: DateTime<Utc>,
}

/// File-backed [`StateStore`], one record per project under `dir`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<project>.json` — pure, no I/O.
    pub fn record_path(&self, project: &ProjectId) -> PathBuf {
        self.dir.join(format!("{project}.json"))
    }
}

impl StateStore for FileStateStore {
    /// Returns `Ok(None)` for a project never seen before (absent file).
    fn get(&self, project: &ProjectId) -> Result<Option<VersionTag>, StateError> {
        let path = self.record_path(project);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| state_io_err(&path, e))?;
        let record: StateRecord =
            serde_json::from_str(&contents).map_err(|source| StateError::Parse { path, source })?;
        Ok(record.last_version)
    }

    fn set(&mut self, project: &ProjectId, version: &VersionTag) -> Result<(), StateError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| state_io_err(&self.dir, e))?;
            set_dir_permissions(&self.dir)?;
        }

        let record = StateRecord {
            project: project.clone(),
            last_version: Some(version.clone()),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.record_path(project);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| state_io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, &path).map_err(|e| state_io_err(&path, e))?;
        Ok(())
    }
}

/// In-memory [`StateStore`] for tests and single-cycle dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    records: HashMap<ProjectId, VersionTag>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, project: &ProjectId) -> Result<Option<VersionTag>, StateError> {
        Ok(self.records.get(project).cloned())
    }

    fn set(&mut self, project: &ProjectId, version: &VersionTag) -> Result<(), StateError> {
        self.records.insert(project.clone(), version.clone());
        Ok(())
    }
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| state_io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StateError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| state_io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StateError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn demo() -> ProjectId {
        ProjectId::from("demo")
    }

    fn v(raw: &str) -> VersionTag {
        VersionTag::parse(raw).expect(raw)
    }

    #[test]
    fn first_sight_returns_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        assert_eq!(store.get(&demo()).unwrap(), None);
    }

    #[test]
    fn set_then_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        store.set(&demo(), &v("v1.0.0")).unwrap();
        assert_eq!(store.get(&demo()).unwrap(), Some(v("v1.0.0")));
    }

    #[test]
    fn set_overwrites_prior_version() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        store.set(&demo(), &v("v1.0.0")).unwrap();
        store.set(&demo(), &v("v1.1.0")).unwrap();
        assert_eq!(store.get(&demo()).unwrap(), Some(v("v1.1.0")));
    }

    #[test]
    fn tmp_file_cleaned_up_after_set() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        store.set(&demo(), &v("v1.0.0")).unwrap();
        let tmp = store.record_path(&demo()).with_extension("json.tmp");
        assert!(!tmp.exists(), "tmp file should be gone after atomic rename");
    }

    #[test]
    fn stale_tmp_file_does_not_shadow_record() {
        // A crash mid-write leaves only a .tmp sibling; get must ignore it.
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        store.set(&demo(), &v("v1.0.0")).unwrap();
        let tmp = store.record_path(&demo()).with_extension("json.tmp");
        std::fs::write(&tmp, "{\"partial").unwrap();
        assert_eq!(store.get(&demo()).unwrap(), Some(v("v1.0.0")));
    }

    #[test]
    fn corrupt_record_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        std::fs::write(store.record_path(&demo()), "not json").unwrap();
        let err = store.get(&demo()).unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
    }

    #[test]
    fn records_are_isolated_per_project() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStateStore::new(dir.path());
        store.set(&demo(), &v("v1.0.0")).unwrap();
        assert_eq!(store.get(&ProjectId::from("other")).unwrap(), None);
    }

    #[test]
    fn memory_store_mirrors_file_store_contract() {
        let mut store = MemoryStateStore::new();
        assert_eq!(store.get(&demo()).unwrap(), None);
        store.set(&demo(), &v("v1.0.0")).unwrap();
        assert_eq!(store.get(&demo()).unwrap(), Some(v("v1.0.0")));
    }
}
