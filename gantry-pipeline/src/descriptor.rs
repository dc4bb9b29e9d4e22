//! Deployment descriptor handling.
//!
//! The runtime host keeps one `docker-compose.yml` per project naming the
//! image reference to run. Repointing that reference at a new tag is done
//! as parse-modify-serialize over the YAML document — never as text
//! substitution — so unexpected formatting can't corrupt the file. Writes
//! are atomic (`.tmp` sibling + rename).

use std::path::Path;

use serde_yaml::Value;
use similar::TextDiff;

use crate::error::{io_err, PipelineError};

/// Fixed descriptor name inside a project's runtime directory.
pub const DESCRIPTOR_FILE: &str = "docker-compose.yml";

/// Outcome of a descriptor update.
#[derive(Debug, Clone)]
pub struct DescriptorUpdate {
    /// Whether any image reference actually changed.
    pub changed: bool,
    /// Names of the services whose image was repointed.
    pub services: Vec<String>,
    /// Unified diff of the change (empty when nothing changed).
    pub diff: String,
}

/// Split an image reference into repository and tag.
///
/// The tag separator is the last `:` that appears after the last `/`, so
/// registry ports are not mistaken for tags
/// (`registry:5000/shop-api:1.2.0` → `("registry:5000/shop-api", Some("1.2.0"))`).
pub fn split_image_ref(image: &str) -> (&str, Option<&str>) {
    let tag_start = match (image.rfind(':'), image.rfind('/')) {
        (Some(colon), Some(slash)) if colon > slash => Some(colon),
        (Some(colon), None) => Some(colon),
        _ => None,
    };
    match tag_start {
        Some(colon) => (&image[..colon], Some(&image[colon + 1..])),
        None => (image, None),
    }
}

/// Repoint every service whose image repository equals `repository` at
/// `tag`. Returns the re-serialized document and the touched service names.
pub fn repoint_images(
    doc: &str,
    repository: &str,
    tag: &str,
) -> Result<(String, Vec<String>), serde_yaml::Error> {
    let mut root: Value = serde_yaml::from_str(doc)?;
    let mut touched = Vec::new();

    if let Some(services) = root.get_mut("services").and_then(Value::as_mapping_mut) {
        for (name, service) in services.iter_mut() {
            let Some(image) = service.get("image").and_then(Value::as_str) else {
                continue;
            };
            let (repo, _) = split_image_ref(image);
            if repo == repository {
                if let Some(service) = service.as_mapping_mut() {
                    service.insert(
                        Value::String("image".to_owned()),
                        Value::String(format!("{repository}:{tag}")),
                    );
                    if let Some(name) = name.as_str() {
                        touched.push(name.to_owned());
                    }
                }
            }
        }
    }

    Ok((serde_yaml::to_string(&root)?, touched))
}

/// Update the descriptor at `path` to run `repository:tag`.
///
/// In dry-run mode the file is left untouched and only the diff is
/// produced. Fails with [`PipelineError::DescriptorMissing`] when the file
/// is absent.
pub fn update_file(
    path: &Path,
    repository: &str,
    tag: &str,
    dry_run: bool,
) -> Result<DescriptorUpdate, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::DescriptorMissing {
            path: path.to_path_buf(),
        });
    }
    let current = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;

    let (updated, services) =
        repoint_images(&current, repository, tag).map_err(|source| {
            PipelineError::DescriptorInvalid {
                path: path.to_path_buf(),
                source,
            }
        })?;

    let changed = updated != current;
    let diff = if changed {
        TextDiff::from_lines(&current, &updated)
            .unified_diff()
            .header("current", "updated")
            .to_string()
    } else {
        String::new()
    };

    if changed && !dry_run {
        let tmp = path.with_extension("yml.gantry.tmp");
        std::fs::write(&tmp, &updated).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    }

    Ok(DescriptorUpdate {
        changed,
        services,
        diff,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
