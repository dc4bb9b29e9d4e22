//! Error taxonomy for the action pipelines.

use std::path::PathBuf;

use thiserror::Error;

use gantry_core::error::{ManifestError, StateError};
use gantry_core::exec::ExecError;

/// All errors that abort a pipeline run. Each step failure carries enough
/// context to be surfaced in logs and notifications without re-running.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Content defect in the monitored project's manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The runtime host has no deployment directory for this project.
    #[error("no deployment directory for '{project}' at {path}")]
    ProjectNotFound { project: String, path: PathBuf },

    /// The deployment descriptor is absent where it must exist.
    #[error("deployment descriptor missing at {path}")]
    DescriptorMissing { path: PathBuf },

    /// The deployment descriptor exists but is not parseable YAML.
    #[error("descriptor at {path} is not valid YAML: {source}")]
    DescriptorInvalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Fetching the tagged revision into the workspace failed.
    #[error("checkout of {reference} failed: {source}")]
    CheckoutFailed {
        reference: String,
        #[source]
        source: ExecError,
    },

    #[error("image build failed for {image}: {source}")]
    BuildFailed {
        image: String,
        #[source]
        source: ExecError,
    },

    #[error("image push failed for {image}: {source}")]
    PushFailed {
        image: String,
        #[source]
        source: ExecError,
    },

    /// Shipping config/secrets to the runtime host failed.
    #[error("config sync to {destination} failed: {source}")]
    SyncFailed {
        destination: String,
        #[source]
        source: ExecError,
    },

    /// Registry credentials were rejected or login could not complete.
    #[error("registry authentication failed for {registry}: {source}")]
    AuthFailed {
        registry: String,
        #[source]
        source: ExecError,
    },

    #[error("image pull failed for '{project}': {source}")]
    PullFailed {
        project: String,
        #[source]
        source: ExecError,
    },

    #[error("service recreate failed for '{project}': {source}")]
    RecreateFailed {
        project: String,
        #[source]
        source: ExecError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Audit log or sync ledger failure.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Convenience constructor for [`PipelineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.into(),
        source,
    }
}
