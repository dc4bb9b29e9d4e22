//! Size-based rotation for the daemon log files.
//!
//! `gantryd.log` and `gantryd-err.log` rotate once they exceed the policy's
//! size cap, shifting numbered backups (`gantryd.log.1` is the newest) and
//! dropping the oldest beyond the backup cap.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Rotation thresholds. Defaults: 10 MiB cap, 5 backups.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_backups: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_backups: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `log_path` if it exceeds the size cap.
    ///
    /// Returns `true` if rotation occurred; a missing file is a no-op.
    pub fn rotate(&self, log_path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(log_path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes {
            return Ok(false);
        }

        // Drop the oldest backup, shift the rest up, then move the live file.
        let oldest = backup_path(log_path, self.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_backups).rev() {
            let src = backup_path(log_path, n);
            if src.exists() {
                fs::rename(&src, backup_path(log_path, n + 1))?;
            }
        }
        fs::rename(log_path, backup_path(log_path, 1))?;

        // Leave a fresh empty file so the daemon always has a writable path.
        fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(log_path)?;

        Ok(true)
    }
}

/// Rotate both daemon log files under `state_root`; per-file errors are
/// logged as warnings and do not block the other file.
pub fn rotate_daemon_logs(state_root: &Path) {
    let policy = RotationPolicy::default();
    for log_path in [
        crate::paths::stdout_log_path(state_root),
        crate::paths::stderr_log_path(state_root),
    ] {
        match policy.rotate(&log_path) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `gantryd.log` → `gantryd.log.<n>`.
fn backup_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.{n}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SMALL_POLICY: RotationPolicy = RotationPolicy {
        max_bytes: 1024,
        max_backups: 3,
    };

    fn write_log(dir: &TempDir, name: &str, size: usize) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, vec![b'x'; size]).unwrap();
        path
    }

    #[test]
    fn small_file_is_not_rotated() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "gantryd.log", 16);
        assert!(!SMALL_POLICY.rotate(&log).unwrap());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_rotates_to_numbered_backup() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir, "gantryd.log", 2048);

        assert!(SMALL_POLICY.rotate(&log).unwrap());
        assert_eq!(fs::metadata(&log).unwrap().len(), 0, "fresh live file");
        assert!(backup_path(&log, 1).exists());
        assert_eq!(fs::metadata(backup_path(&log, 1)).unwrap().len(), 2048);
    }

    #[test]
    fn backups_are_capped() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gantryd.log");
        for n in 1..=SMALL_POLICY.max_backups {
            fs::write(backup_path(&log, n), format!("backup-{n}")).unwrap();
        }
        write_log(&dir, "gantryd.log", 2048);

        assert!(SMALL_POLICY.rotate(&log).unwrap());
        assert!(backup_path(&log, SMALL_POLICY.max_backups).exists());
        assert!(
            !backup_path(&log, SMALL_POLICY.max_backups + 1).exists(),
            "must never create more than max_backups files"
        );
    }

    #[test]
    fn missing_file_is_a_noop() {
        let dir = TempDir::new().unwrap();
        assert!(!SMALL_POLICY.rotate(&dir.path().join("absent.log")).unwrap());
    }

    #[test]
    fn repeated_rotations_shift_backups() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gantryd.log");
        for round in 1..=3usize {
            fs::write(&log, vec![b'0' + round as u8; 2048]).unwrap();
            SMALL_POLICY.rotate(&log).unwrap();
        }
        for n in 1..=3 {
            assert!(backup_path(&log, n).exists(), "backup .{n} should exist");
        }
        // .1 holds the most recent round's content.
        let newest = fs::read(backup_path(&log, 1)).unwrap();
        assert_eq!(newest[0], b'3');
    }
}
