//! Per-project release manifest.
//!
//! A YAML document at a fixed path in the tagged revision. The build
//! pipeline reads it for the canonical deployable name used as the image
//! repository path; the optional pre/post command lists are parsed for
//! validation but executed by the external release tool, not by Gantry.

use std::path::Path;

use serde::Deserialize;

use crate::error::ManifestError;

/// Fixed manifest path relative to the checked-out revision root.
pub const MANIFEST_FILE: &str = "gantry.yaml";

/// Declarative per-project metadata, sourced from the tagged revision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    /// Canonical deployable name; becomes the image repository path segment.
    pub project_name: String,

    /// Ordered commands the release tool runs before tagging.
    #[serde(default)]
    pub pre_release: Vec<String>,

    /// Ordered commands the release tool runs after tagging.
    #[serde(default)]
    pub post_release: Vec<String>,
}

/// Load `gantry.yaml` from a checked-out revision at `dir`.
///
/// Fails with [`ManifestError::Missing`] if the file is absent and
/// [`ManifestError::Invalid`] if `project_name` is blank or not a single
/// path segment — both are content defects in the monitored project, not
/// transient conditions.
pub fn load_manifest(dir: &Path) -> Result<Manifest, ManifestError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Err(ManifestError::Missing { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: Manifest = serde_yaml::from_str(&contents).map_err(|source| {
        ManifestError::Parse {
            path: path.clone(),
            source,
        }
    })?;

    let name = manifest.project_name.trim();
    if name.is_empty() {
        return Err(ManifestError::Invalid {
            path,
            reason: "project_name is missing or blank".to_owned(),
        });
    }
    if name.contains(['/', ' ']) {
        return Err(ManifestError::Invalid {
            path,
            reason: format!("project_name '{name}' must be a single path segment"),
        });
    }

    Ok(manifest)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_manifest(dir: &TempDir, contents: &str) {
        std::fs::write(dir.path().join(MANIFEST_FILE), contents).unwrap();
    }

    #[test]
    fn loads_name_and_release_steps() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            &dir,
            "project_name: shop-api\npre_release:\n  - cargo test\npost_release:\n  - ./announce.sh\n",
        );
        let manifest = load_manifest(dir.path()).unwrap();
        assert_eq!(manifest.project_name, "shop-api");
        assert_eq!(manifest.pre_release, vec!["cargo test"]);
        assert_eq!(manifest.post_release, vec!["./announce.sh"]);
    }

    #[test]
    fn release_steps_default_to_empty() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "project_name: shop-api\n");
        let manifest = load_manifest(dir.path()).unwrap();
        assert!(manifest.pre_release.is_empty());
        assert!(manifest.post_release.is_empty());
    }

    #[test]
    fn missing_file_is_distinct_from_invalid_content() {
        let dir = TempDir::new().unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Missing { .. }));
    }

    #[test]
    fn blank_project_name_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "project_name: \"  \"\n");
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }

    #[test]
    fn absent_project_name_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "pre_release: []\n");
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn multi_segment_project_name_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "project_name: team/shop-api\n");
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
    }
}
