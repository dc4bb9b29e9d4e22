pub mod cd;
pub mod ci;
pub mod daemon;
pub mod projects;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;

use gantry_core::error::StateError;
use gantry_core::state::{FileStateStore, StateStore};
use gantry_core::types::ProjectId;
use gantry_core::version::VersionTag;
use gantry_daemon::{paths, run_cycle, CycleStatus};
use gantry_pipeline::ActionPipeline;
use gantry_source::TagSource;

/// Resolve the state root: explicit flag, else `~/.gantry`.
pub fn resolve_state_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(root) => Ok(root),
        None => paths::default_state_root()
            .context("could not determine home directory; pass --state-root"),
    }
}

/// Run a single poll cycle in the foreground and print per-project results.
///
/// With `read_only` set (dry runs), recorded state is consulted but never
/// advanced. Exits nonzero when any project's pipeline failed.
pub fn run_once(
    state_root: &Path,
    projects_file: &Path,
    source: &dyn TagSource,
    pipeline: &dyn ActionPipeline,
    read_only: bool,
) -> Result<()> {
    let projects = gantry_core::projects::load_projects(projects_file)
        .with_context(|| format!("failed to read projects file {}", projects_file.display()))?;
    if projects.is_empty() {
        println!("No projects configured in {}.", projects_file.display());
        return Ok(());
    }

    let file_store = FileStateStore::new(paths::state_dir(state_root));
    let outcomes = if read_only {
        let mut store = ReadOnlyStore(file_store);
        run_cycle(&projects, source, &mut store, pipeline)
    } else {
        let mut store = file_store;
        run_cycle(&projects, source, &mut store, pipeline)
    };

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.status {
            CycleStatus::Updated(version) => {
                println!("  {}  {} → {version}", "✓".green(), outcome.project);
            }
            CycleStatus::Unchanged => {
                println!("  {}  {} unchanged", "·".dimmed(), outcome.project);
            }
            CycleStatus::NoReleases => {
                println!("  {}  {} has no releases yet", "·".dimmed(), outcome.project);
            }
            CycleStatus::SourceUnavailable(reason) => {
                println!(
                    "  {}  {} source unavailable: {reason}",
                    "~".yellow(),
                    outcome.project
                );
            }
            CycleStatus::Failed { version, error } => {
                failed += 1;
                println!("  {}  {} {version}: {error}", "✗".red(), outcome.project);
            }
            CycleStatus::Error(error) => {
                failed += 1;
                println!("  {}  {}: {error}", "✗".red(), outcome.project);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} project(s) failed this cycle");
    }
    Ok(())
}

/// `get` reads the durable records; `set` is a no-op (dry runs).
struct ReadOnlyStore(FileStateStore);

impl StateStore for ReadOnlyStore {
    fn get(&self, project: &ProjectId) -> Result<Option<VersionTag>, StateError> {
        self.0.get(project)
    }

    fn set(&mut self, _project: &ProjectId, _version: &VersionTag) -> Result<(), StateError> {
        Ok(())
    }
}
