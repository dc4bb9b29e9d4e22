//! The poll-cycle state machine.
//!
//! One cycle iterates all configured projects strictly sequentially. Per
//! project: query the tag source, compare against the processed-state
//! store, and run the action pipeline when they differ — advancing the
//! store only on full pipeline success. Every failure is contained within
//! its project: an unreachable source or a failed pipeline never aborts
//! the rest of the cycle, and the same stale-vs-latest mismatch is
//! detected again next cycle, retrying automatically.

use gantry_core::state::StateStore;
use gantry_core::types::{Project, ProjectId};
use gantry_core::version::VersionTag;
use gantry_pipeline::ActionPipeline;
use gantry_source::TagSource;

/// What happened to one project in one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// The source has no version tags yet.
    NoReleases,
    /// Latest tag equals the stored version; nothing to do.
    Unchanged,
    /// The source could not be reached; treated as unchanged this cycle.
    SourceUnavailable(String),
    /// The pipeline ran to completion and the store was advanced.
    Updated(VersionTag),
    /// The pipeline aborted; the store was left untouched.
    Failed { version: VersionTag, error: String },
    /// The state store itself failed for this project.
    Error(String),
}

impl CycleStatus {
    /// Whether this outcome counts against the project's failure streak.
    pub fn is_failure(&self) -> bool {
        matches!(self, CycleStatus::Failed { .. } | CycleStatus::Error(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleStatus::NoReleases => "no-releases",
            CycleStatus::Unchanged => "unchanged",
            CycleStatus::SourceUnavailable(_) => "source-unavailable",
            CycleStatus::Updated(_) => "updated",
            CycleStatus::Failed { .. } => "failed",
            CycleStatus::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub project: ProjectId,
    pub status: CycleStatus,
}

/// Run one poll cycle over `projects`.
pub fn run_cycle(
    projects: &[Project],
    source: &dyn TagSource,
    store: &mut dyn StateStore,
    pipeline: &dyn ActionPipeline,
) -> Vec<CycleOutcome> {
    projects
        .iter()
        .map(|project| CycleOutcome {
            project: project.id.clone(),
            status: poll_project(project, source, store, pipeline),
        })
        .collect()
}

fn poll_project(
    project: &Project,
    source: &dyn TagSource,
    store: &mut dyn StateStore,
    pipeline: &dyn ActionPipeline,
) -> CycleStatus {
    let latest = match source.latest(project) {
        Ok(Some(latest)) => latest,
        Ok(None) => {
            tracing::info!(project = %project.id, "no releases yet");
            return CycleStatus::NoReleases;
        }
        Err(err) => {
            // Transient by definition; the loop must keep running.
            tracing::warn!(project = %project.id, error = %err, "tag source unavailable");
            return CycleStatus::SourceUnavailable(err.to_string());
        }
    };

    let stored = match store.get(&project.id) {
        Ok(stored) => stored,
        Err(err) => {
            tracing::error!(project = %project.id, error = %err, "state store read failed");
            return CycleStatus::Error(err.to_string());
        }
    };

    if stored.as_ref() == Some(&latest) {
        tracing::debug!(project = %project.id, version = %latest, "unchanged");
        return CycleStatus::Unchanged;
    }

    tracing::info!(
        project = %project.id,
        latest = %latest,
        stored = %stored.as_ref().map(VersionTag::as_str).unwrap_or("(none)"),
        "change detected, running pipeline",
    );

    match pipeline.run(project, &latest) {
        Ok(()) => {
            if let Err(err) = store.set(&project.id, &latest) {
                // Side effects are applied but unrecorded; the next cycle
                // re-runs the pipeline for the same version.
                tracing::error!(
                    project = %project.id,
                    version = %latest,
                    error = %err,
                    "pipeline succeeded but state was not recorded; will re-run",
                );
                return CycleStatus::Error(err.to_string());
            }
            CycleStatus::Updated(latest)
        }
        Err(err) => {
            tracing::error!(project = %project.id, version = %latest, error = %err, "pipeline failed");
            CycleStatus::Failed {
                version: latest,
                error: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gantry_core::state::MemoryStateStore;
    use gantry_pipeline::PipelineError;
    use gantry_source::SourceError;

    use super::*;

    fn v(raw: &str) -> VersionTag {
        VersionTag::parse(raw).expect(raw)
    }

    fn demo() -> Project {
        Project::new("demo", "https://git.example.com/team/demo.git")
    }

    /// Tag source returning a fixed answer per call.
    struct FixedSource(Result<Option<&'static str>, &'static str>);

    impl TagSource for FixedSource {
        fn latest(&self, project: &Project) -> Result<Option<VersionTag>, SourceError> {
            match &self.0 {
                Ok(Some(raw)) => Ok(Some(v(raw))),
                Ok(None) => Ok(None),
                Err(reason) => Err(SourceError::Unavailable {
                    project: project.id.to_string(),
                    reason: (*reason).to_owned(),
                }),
            }
        }
    }

    /// Pipeline that records invocations and fails on demand.
    #[derive(Default)]
    struct RecordingPipeline {
        fail: bool,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl RecordingPipeline {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ActionPipeline for RecordingPipeline {
        fn run(&self, project: &Project, version: &VersionTag) -> Result<(), PipelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((project.id.to_string(), version.to_string()));
            if self.fail {
                Err(PipelineError::PushFailed {
                    image: format!("registry/{}:{}", project.id, version.image_tag()),
                    source: gantry_core::exec::ExecError::Failed {
                        program: "docker".to_owned(),
                        status: "status 1".to_owned(),
                        stderr: "connection refused".to_owned(),
                    },
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn first_sight_with_a_release_runs_the_pipeline() {
        let mut store = MemoryStateStore::new();
        let pipeline = RecordingPipeline::default();
        let outcomes = run_cycle(
            &[demo()],
            &FixedSource(Ok(Some("v1.0.0"))),
            &mut store,
            &pipeline,
        );

        assert_eq!(outcomes[0].status, CycleStatus::Updated(v("v1.0.0")));
        assert_eq!(store.get(&ProjectId::from("demo")).unwrap(), Some(v("v1.0.0")));
        assert_eq!(pipeline.calls().len(), 1);
    }

    #[test]
    fn unchanged_state_is_idempotent() {
        let mut store = MemoryStateStore::new();
        let source = FixedSource(Ok(Some("v1.0.0")));

        let pipeline = RecordingPipeline::default();
        run_cycle(&[demo()], &source, &mut store, &pipeline);
        assert_eq!(pipeline.calls().len(), 1);

        // Same latest on the next cycle: no pipeline run, state unchanged.
        let outcomes = run_cycle(&[demo()], &source, &mut store, &pipeline);
        assert_eq!(outcomes[0].status, CycleStatus::Unchanged);
        assert_eq!(pipeline.calls().len(), 1, "pipeline must not re-run");
        assert_eq!(store.get(&ProjectId::from("demo")).unwrap(), Some(v("v1.0.0")));
    }

    #[test]
    fn failed_pipeline_leaves_state_and_retries_same_version() {
        let mut store = MemoryStateStore::new();
        store.set(&ProjectId::from("demo"), &v("v1.0.0")).unwrap();
        let source = FixedSource(Ok(Some("v1.1.0")));
        let pipeline = RecordingPipeline::failing();

        let outcomes = run_cycle(&[demo()], &source, &mut store, &pipeline);
        assert!(matches!(outcomes[0].status, CycleStatus::Failed { .. }));
        assert_eq!(
            store.get(&ProjectId::from("demo")).unwrap(),
            Some(v("v1.0.0")),
            "at-most-once: a partial pipeline must not advance state"
        );

        // Next cycle re-attempts the full pipeline for the SAME target.
        run_cycle(&[demo()], &source, &mut store, &pipeline);
        let calls = pipeline.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "v1.1.0");
        assert_eq!(calls[1].1, "v1.1.0");
    }

    #[test]
    fn no_releases_runs_nothing() {
        let mut store = MemoryStateStore::new();
        let pipeline = RecordingPipeline::default();
        let outcomes = run_cycle(&[demo()], &FixedSource(Ok(None)), &mut store, &pipeline);

        assert_eq!(outcomes[0].status, CycleStatus::NoReleases);
        assert!(pipeline.calls().is_empty());
        assert_eq!(store.get(&ProjectId::from("demo")).unwrap(), None);
    }

    #[test]
    fn unavailable_source_is_treated_as_unchanged() {
        let mut store = MemoryStateStore::new();
        let pipeline = RecordingPipeline::default();
        let outcomes = run_cycle(
            &[demo()],
            &FixedSource(Err("connection timed out")),
            &mut store,
            &pipeline,
        );

        assert!(matches!(
            outcomes[0].status,
            CycleStatus::SourceUnavailable(_)
        ));
        assert!(pipeline.calls().is_empty());
    }

    #[test]
    fn one_failing_project_never_aborts_the_others() {
        struct PerProjectSource;
        impl TagSource for PerProjectSource {
            fn latest(&self, project: &Project) -> Result<Option<VersionTag>, SourceError> {
                if project.id.as_str() == "broken" {
                    Err(SourceError::Unavailable {
                        project: project.id.to_string(),
                        reason: "unreachable".to_owned(),
                    })
                } else {
                    Ok(Some(v("v1.0.0")))
                }
            }
        }

        let projects = [
            Project::new("broken", "https://down.example.com/broken.git"),
            Project::new("healthy", "https://git.example.com/healthy.git"),
        ];
        let mut store = MemoryStateStore::new();
        let pipeline = RecordingPipeline::default();
        let outcomes = run_cycle(&projects, &PerProjectSource, &mut store, &pipeline);

        assert!(matches!(
            outcomes[0].status,
            CycleStatus::SourceUnavailable(_)
        ));
        assert_eq!(outcomes[1].status, CycleStatus::Updated(v("v1.0.0")));
        assert_eq!(
            store.get(&ProjectId::from("healthy")).unwrap(),
            Some(v("v1.0.0"))
        );
    }

    #[test]
    fn newer_tag_supersedes_stored_version() {
        let mut store = MemoryStateStore::new();
        store.set(&ProjectId::from("demo"), &v("v1.9.0")).unwrap();
        let pipeline = RecordingPipeline::default();

        let outcomes = run_cycle(
            &[demo()],
            &FixedSource(Ok(Some("v1.10.0"))),
            &mut store,
            &pipeline,
        );
        assert_eq!(outcomes[0].status, CycleStatus::Updated(v("v1.10.0")));
    }
}
