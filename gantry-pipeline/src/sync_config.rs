//! Config and secrets shipping to the runtime host.
//!
//! After a successful push, the build pipeline copies the project's
//! deployment descriptor (required) and its `secrets/` directory (optional
//! — absence is a skip, not an error) to
//! `<runtime host>:<deploy root>/<name>/` over ssh/scp, creating the
//! remote directory if needed.
//!
//! A per-project sync ledger at `<sync_dir>/<project>.json` records the
//! SHA-256 digests last successfully shipped, so re-running the pipeline
//! for the same version (after a late-step failure) skips unchanged
//! copies. Ledger writes use the atomic `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gantry_core::error::StateError;
use gantry_core::exec::{CommandSpec, RetryPolicy};
use gantry_core::types::ProjectId;

use crate::descriptor::DESCRIPTOR_FILE;
use crate::error::{io_err, PipelineError};

/// Optional secrets directory name inside the checked-out revision.
pub const SECRETS_DIR: &str = "secrets";

/// What a sync run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub shipped: usize,
    pub unchanged: usize,
}

/// On-disk sync ledger payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SyncLedger {
    synced_at: DateTime<Utc>,
    files: BTreeMap<String, String>,
}

/// Ship descriptor and secrets for one project.
///
/// `source_dir` is the checked-out revision root; `name` is the canonical
/// deployable name from the manifest.
pub fn sync_project(
    runtime_host: &str,
    deploy_root: &Path,
    name: &str,
    source_dir: &Path,
    sync_dir: &Path,
    project: &ProjectId,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<SyncOutcome, PipelineError> {
    let descriptor = source_dir.join(DESCRIPTOR_FILE);
    if !descriptor.exists() {
        return Err(PipelineError::DescriptorMissing { path: descriptor });
    }

    // Digest everything we would ship, keyed by path relative to the
    // remote project directory.
    let mut current = BTreeMap::new();
    current.insert(DESCRIPTOR_FILE.to_owned(), file_digest(&descriptor)?);

    let secrets_dir = source_dir.join(SECRETS_DIR);
    let has_secrets = secrets_dir.is_dir();
    if has_secrets {
        for (rel, path) in collect_files(&secrets_dir, SECRETS_DIR)? {
            current.insert(rel, file_digest(&path)?);
        }
    }

    let ledger = load_ledger(sync_dir, project)?;
    let changed = plan_changes(&current, &ledger);
    if changed.is_empty() {
        tracing::debug!("config for '{project}' unchanged since last sync");
        return Ok(SyncOutcome {
            shipped: 0,
            unchanged: current.len(),
        });
    }

    let remote_dir = remote_project_dir(deploy_root, name);
    let destination = format!("{runtime_host}:{remote_dir}");

    // Remote directory first, then descriptor, then secrets.
    let mkdir = CommandSpec::new("ssh")
        .arg(runtime_host)
        .arg(format!("mkdir -p {remote_dir}"))
        .timeout(timeout);
    retry.run(&mkdir).map_err(|source| PipelineError::SyncFailed {
        destination: destination.clone(),
        source,
    })?;

    if changed.iter().any(|rel| rel == DESCRIPTOR_FILE) {
        let scp = CommandSpec::new("scp")
            .arg("-q")
            .arg(descriptor.display().to_string())
            .arg(format!("{runtime_host}:{remote_dir}/{DESCRIPTOR_FILE}"))
            .timeout(timeout);
        retry.run(&scp).map_err(|source| PipelineError::SyncFailed {
            destination: destination.clone(),
            source,
        })?;
    }

    if has_secrets && changed.iter().any(|rel| rel.starts_with(SECRETS_DIR)) {
        let scp = CommandSpec::new("scp")
            .args(["-q", "-r"])
            .arg(secrets_dir.display().to_string())
            .arg(format!("{runtime_host}:{remote_dir}/"))
            .timeout(timeout);
        retry.run(&scp).map_err(|source| PipelineError::SyncFailed {
            destination: destination.clone(),
            source,
        })?;
    }

    let shipped = changed.len();
    let unchanged = current.len() - shipped;
    save_ledger(sync_dir, project, &current)?;

    Ok(SyncOutcome { shipped, unchanged })
}

/// `<deploy root>/<name>` as a remote path string.
fn remote_project_dir(deploy_root: &Path, name: &str) -> String {
    let root = deploy_root.display().to_string();
    format!("{}/{name}", root.trim_end_matches('/'))
}

/// Files whose digest differs from (or is absent in) the ledger.
fn plan_changes(
    current: &BTreeMap<String, String>,
    ledger: &BTreeMap<String, String>,
) -> Vec<String> {
    current
        .iter()
        .filter(|(rel, digest)| ledger.get(*rel) != Some(*digest))
        .map(|(rel, _)| rel.clone())
        .collect()
}

fn file_digest(path: &Path) -> Result<String, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Walk `dir` collecting `(relative path, absolute path)` pairs, sorted.
fn collect_files(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let rel = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        if path.is_dir() {
            files.extend(collect_files(&path, &rel)?);
        } else {
            files.push((rel, path));
        }
    }
    files.sort();
    Ok(files)
}

fn ledger_path(sync_dir: &Path, project: &ProjectId) -> PathBuf {
    sync_dir.join(format!("{project}.json"))
}

/// Returns an empty ledger when none exists yet.
fn load_ledger(
    sync_dir: &Path,
    project: &ProjectId,
) -> Result<BTreeMap<String, String>, StateError> {
    let path = ledger_path(sync_dir, project);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| StateError::Io {
        path: path.clone(),
        source,
    })?;
    let ledger: SyncLedger =
        serde_json::from_str(&contents).map_err(|source| StateError::Parse { path, source })?;
    Ok(ledger.files)
}

fn save_ledger(
    sync_dir: &Path,
    project: &ProjectId,
    files: &BTreeMap<String, String>,
) -> Result<(), StateError> {
    if !sync_dir.exists() {
        std::fs::create_dir_all(sync_dir).map_err(|source| StateError::Io {
            path: sync_dir.to_path_buf(),
            source,
        })?;
    }
    let ledger = SyncLedger {
        synced_at: Utc::now(),
        files: files.clone(),
    };
    let json = serde_json::to_string_pretty(&ledger)?;
    let path = ledger_path(sync_dir, project);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, &path).map_err(|source| StateError::Io { path, source })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
