//! The projects file — the human-edited list of what to monitor.
//!
//! Plain text, one entry per line; blank lines and `#`-prefixed lines are
//! ignored. Build-host entries are Git remote URLs, runtime-host entries
//! are image-repository names. File order is preserved.

use std::path::Path;

use crate::error::ProjectsError;
use crate::types::{Project, ProjectId};

/// Load and parse the projects file at `path`.
///
/// Returns `ProjectsError::NotFound` if the file is absent — a poll loop
/// cannot run without its registry of projects.
pub fn load_projects(path: &Path) -> Result<Vec<Project>, ProjectsError> {
    if !path.exists() {
        return Err(ProjectsError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ProjectsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_projects(&contents))
}

/// Parse projects-file content: skip blank and comment lines, keep order.
pub fn parse_projects(contents: &str) -> Vec<Project> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Project {
            id: derive_id(line),
            source: line.to_owned(),
        })
        .collect()
}

/// Derive a project identifier from a source locator.
///
/// For Git URLs this is the repository basename with a trailing `.git`
/// stripped (`https://host/team/shop-api.git` → `shop-api`, and likewise
/// for `git@host:team/shop-api.git`). Plain image-repository names map to
/// themselves.
pub fn derive_id(source: &str) -> ProjectId {
    let trimmed = source.trim_end_matches('/');
    let basename = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    let name = basename.strip_suffix(".git").unwrap_or(basename);
    ProjectId::from(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
