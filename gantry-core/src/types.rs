//! Domain types shared by the CI and CD poll loops.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem
//! paths. Everything here is serializable via serde.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a monitored project, unique within a
/// projects file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A unit of monitoring and deployment.
///
/// `source` is the project's source locator: a Git remote URL on the build
/// host, or an image-repository name on the runtime host. Projects are
/// created by entries in the projects file and never mutated here; removal
/// happens by editing the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub source: String,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_display() {
        assert_eq!(ProjectId::from("demo").to_string(), "demo");
    }

    #[test]
    fn project_id_equality() {
        let a = ProjectId::from("x");
        let b = ProjectId::from(String::from("x"));
        assert_eq!(a, b);
    }

    #[test]
    fn project_serde_roundtrip() {
        let project = Project::new("demo", "https://git.example.com/team/demo.git");
        let json = serde_json::to_string(&project).expect("serialize");
        let back: Project = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(project, back);
    }
}
