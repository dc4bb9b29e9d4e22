//! # gantry-pipeline
//!
//! The side-effecting, all-or-nothing action pipelines triggered by a
//! detected version change: build/push/sync on the build host
//! ([`BuildPipeline`]) and pull/redeploy on the runtime host
//! ([`DeployPipeline`]). Every step is a hard gate; a failure anywhere
//! aborts the run and leaves the processed-state store untouched so the
//! next poll cycle retries the same target version.

pub mod build;
pub mod deploy;
pub mod descriptor;
pub mod notify;
pub mod sync_config;
pub mod workspace;

mod error;

pub use build::{BuildConfig, BuildPipeline};
pub use deploy::{DeployConfig, DeployPipeline};
pub use descriptor::{DescriptorUpdate, DESCRIPTOR_FILE};
pub use error::PipelineError;
pub use notify::{Channel, CommandNotifier, Notifier};
pub use workspace::Workspace;

use gantry_core::types::Project;
use gantry_core::version::VersionTag;

/// A multi-step side-effecting operation keyed by (project, version).
///
/// Implementations must be safe to re-run for the same version: the poll
/// loop retries a failed run on its next cycle with the same target.
pub trait ActionPipeline {
    fn run(&self, project: &Project, version: &VersionTag) -> Result<(), PipelineError>;
}
