//! Error types for gantry-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from the processed-state store and audit log.
#[derive(Debug, Error)]
pub enum StateError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state record existed but could not be parsed.
    #[error("failed to parse state record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (write path).
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// All errors that can arise from reading the projects file.
#[derive(Debug, Error)]
pub enum ProjectsError {
    /// The projects file did not exist at the expected path.
    #[error("projects file not found at {path}")]
    NotFound { path: PathBuf },

    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that can arise from loading a release manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No manifest file at the fixed path in the tagged revision.
    #[error("manifest not found at {path}")]
    Missing { path: PathBuf },

    /// Underlying I/O failure reading the manifest.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error — includes file path and line context from serde_yaml.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The manifest parsed but its content is unusable.
    #[error("invalid manifest at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Convenience constructor for [`StateError::Io`].
pub(crate) fn state_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}
