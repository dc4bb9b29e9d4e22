//! # gantry-core
//!
//! Domain types and durable storage for the Gantry poll loops: project
//! identities, version-sort tag ordering, the projects file, the release
//! manifest, the per-project processed-state store, the deployment audit
//! log, and the timeout/backoff-aware external command runner.

pub mod audit;
pub mod error;
pub mod exec;
pub mod manifest;
pub mod projects;
pub mod state;
pub mod types;
pub mod version;

pub use audit::AuditLog;
pub use error::{ManifestError, ProjectsError, StateError};
pub use exec::{CommandSpec, ExecError, ExecOutput, RetryPolicy};
pub use manifest::{load_manifest, Manifest, MANIFEST_FILE};
pub use projects::{load_projects, parse_projects};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use types::{Project, ProjectId};
pub use version::VersionTag;
