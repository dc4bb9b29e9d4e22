//! # gantry-source
//!
//! "What is the latest known version of a project?" — answered either from
//! a remote Git repository's tags ([`GitTagSource`], build host) or from a
//! private registry's tag list ([`RegistryTagSource`], runtime host).

pub mod git;
pub mod registry;

use std::path::PathBuf;

use thiserror::Error;

use gantry_core::types::Project;
use gantry_core::version::VersionTag;

pub use git::GitTagSource;
pub use registry::RegistryTagSource;

/// A queryable source of version tags for monitored projects.
pub trait TagSource {
    /// The highest version-sort tag currently at the source, or `None` when
    /// no version-shaped tags exist yet — a normal, expected steady state,
    /// never to be conflated with the source being unreachable.
    fn latest(&self, project: &Project) -> Result<Option<VersionTag>, SourceError>;
}

/// Errors from querying a tag source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The remote could not be reached or refused us (network/auth/transport).
    /// Transient from the poll loop's perspective: logged and treated as
    /// "no change this cycle".
    #[error("source unavailable for '{project}': {reason}")]
    Unavailable { project: String, reason: String },

    /// Local cache maintenance failed (mirror directory I/O).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn unavailable(project: &Project, reason: impl Into<String>) -> SourceError {
    SourceError::Unavailable {
        project: project.id.to_string(),
        reason: reason.into(),
    }
}
