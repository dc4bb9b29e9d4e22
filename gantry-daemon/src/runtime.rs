use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use gantry_core::projects;
use gantry_core::state::FileStateStore;
use gantry_core::types::Project;
use gantry_pipeline::ActionPipeline;
use gantry_source::TagSource;

use crate::error::{io_err, DaemonError};
use crate::paths::{
    logs_dir, run_dir, socket_path, state_dir, DAEMON_LABEL, DEBOUNCE_WINDOW,
};
use crate::poll::{self, CycleOutcome};
use crate::protocol::{DaemonRequest, DaemonResponse};

/// Which half of the system this loop instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Build host: watch Git tags, build/push/sync.
    Ci,
    /// Runtime host: watch the registry, pull/redeploy.
    Cd,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Ci => write!(f, "ci"),
            Role::Cd => write!(f, "cd"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: Role,
    pub state_root: PathBuf,
    pub projects_file: PathBuf,
    pub interval: Duration,
}

/// Per-project rolling status, surfaced over the control socket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectStatus {
    pub last_version: Option<String>,
    pub outcome: String,
    pub failure_streak: u32,
    pub last_cycle_at_unix: u64,
}

/// Consecutive failures after which a project is called out at error level.
const FAILURE_STREAK_ESCALATION: u32 = 3;

type SharedProjects = Arc<RwLock<Vec<Project>>>;
type StatusMap = HashMap<String, ProjectStatus>;

struct CycleJob {
    trigger: &'static str,
    respond_to: Option<oneshot::Sender<Result<CycleSummary, String>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub trigger: String,
    pub projects: usize,
    pub updated: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    config: RuntimeConfig,
    source: Arc<dyn TagSource + Send + Sync>,
    pipeline: Arc<dyn ActionPipeline + Send + Sync>,
) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config, source, pipeline))
}

/// Run the daemon runtime.
pub async fn run(
    config: RuntimeConfig,
    source: Arc<dyn TagSource + Send + Sync>,
    pipeline: Arc<dyn ActionPipeline + Send + Sync>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&config.state_root)?;

    let initial = projects::load_projects(&config.projects_file)?;
    tracing::info!(
        role = %config.role,
        projects = initial.len(),
        interval_secs = config.interval.as_secs(),
        "gantry poll loop starting",
    );

    let projects: SharedProjects = Arc::new(RwLock::new(initial));
    let statuses: Arc<RwLock<StatusMap>> = Arc::new(RwLock::new(HashMap::new()));
    let started_at_unix = unix_seconds_now();

    let (cycle_tx, cycle_rx) = mpsc::channel::<CycleJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let ticker_handle = {
        let shutdown = shutdown_tx.clone();
        let cycle_tx = cycle_tx.clone();
        let interval = config.interval;
        tokio::spawn(async move {
            let result = ticker_task(interval, cycle_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let projects = projects.clone();
        let statuses = statuses.clone();
        let source = source.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let result = cycle_processor_task(
                config, projects, statuses, source, pipeline, cycle_rx,
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let projects_file = config.projects_file.clone();
        let projects = projects.clone();
        tokio::spawn(async move {
            let result = watcher_task(projects_file, projects, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let config = config.clone();
        let projects = projects.clone();
        let statuses = statuses.clone();
        let cycle_tx = cycle_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                config,
                projects,
                statuses,
                cycle_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let state_root = config.state_root.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(state_root, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down poll loop");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (ticker_result, processor_result, watcher_result, socket_result, rotation_result, signal_result) =
        tokio::join!(
            ticker_handle,
            processor_handle,
            watcher_handle,
            socket_handle,
            rotation_handle,
            signal_handle
        );

    handle_join("ticker", ticker_result)?;
    handle_join("cycle_processor", processor_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Enqueue a cycle on every interval tick. The first tick fires
/// immediately, so a freshly started daemon catches up without waiting a
/// full interval.
async fn ticker_task(
    interval: Duration,
    cycle_tx: mpsc::Sender<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let job = CycleJob { trigger: "interval", respond_to: None };
                if cycle_tx.send(job).await.is_err() {
                    return Err(DaemonError::ChannelClosed("cycle queue"));
                }
            }
        }
    }
    Ok(())
}

async fn cycle_processor_task(
    config: RuntimeConfig,
    projects: SharedProjects,
    statuses: Arc<RwLock<StatusMap>>,
    source: Arc<dyn TagSource + Send + Sync>,
    pipeline: Arc<dyn ActionPipeline + Send + Sync>,
    mut cycle_rx: mpsc::Receiver<CycleJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = cycle_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                let snapshot: Vec<Project> = projects.read().await.clone();
                let state_root = config.state_root.clone();
                let source = source.clone();
                let pipeline = pipeline.clone();

                // The cycle is blocking by design (sequential pipelines);
                // keep it off the async workers.
                let cycle_result = tokio::task::spawn_blocking(move || {
                    let mut store = FileStateStore::new(state_dir(&state_root));
                    poll::run_cycle(&snapshot, source.as_ref(), &mut store, pipeline.as_ref())
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("cycle task join error: {err}")))?;

                let outcome: Result<CycleSummary, String> = {
                    let now = unix_seconds_now();
                    let mut map = statuses.write().await;
                    apply_outcomes(&mut map, &cycle_result, now);
                    Ok(build_cycle_summary(job.trigger, &cycle_result, started.elapsed()))
                };

                if let Ok(summary) = &outcome {
                    tracing::info!(
                        trigger = summary.trigger,
                        projects = summary.projects,
                        updated = summary.updated,
                        failed = summary.failed,
                        duration_ms = summary.duration_ms as u64,
                        "poll cycle completed",
                    );
                }

                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(outcome);
                }
            }
        }
    }
    Ok(())
}

/// Fold one cycle's outcomes into the rolling per-project status map.
fn apply_outcomes(map: &mut StatusMap, outcomes: &[CycleOutcome], now: u64) {
    for outcome in outcomes {
        let entry = map.entry(outcome.project.to_string()).or_default();
        entry.outcome = outcome.status.label().to_owned();
        entry.last_cycle_at_unix = now;

        match &outcome.status {
            poll::CycleStatus::Updated(version) => {
                entry.last_version = Some(version.to_string());
                entry.failure_streak = 0;
            }
            poll::CycleStatus::Unchanged | poll::CycleStatus::NoReleases => {
                entry.failure_streak = 0;
            }
            // Transient unreachability neither grows nor resets the streak.
            poll::CycleStatus::SourceUnavailable(_) => {}
            status if status.is_failure() => {
                entry.failure_streak += 1;
                if entry.failure_streak >= FAILURE_STREAK_ESCALATION {
                    tracing::error!(
                        project = %outcome.project,
                        streak = entry.failure_streak,
                        "project failing repeatedly; operator attention needed",
                    );
                }
            }
            _ => {}
        }
    }
}

fn build_cycle_summary(
    trigger: &'static str,
    outcomes: &[CycleOutcome],
    duration: Duration,
) -> CycleSummary {
    let updated = outcomes
        .iter()
        .filter(|o| matches!(o.status, poll::CycleStatus::Updated(_)))
        .count();
    let failed = outcomes.iter().filter(|o| o.status.is_failure()).count();
    CycleSummary {
        trigger: trigger.to_owned(),
        projects: outcomes.len(),
        updated,
        failed,
        duration_ms: duration.as_millis(),
    }
}

/// Reload the projects file when it changes on disk, so edits take effect
/// without a restart. A parse failure keeps the previous list.
async fn watcher_task(
    projects_file: PathBuf,
    projects: SharedProjects,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let watch_dir = projects_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let watch_dir = fs::canonicalize(&watch_dir).unwrap_or(watch_dir);
    let file_name = projects_file.file_name().map(|name| name.to_os_string());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    _watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "projects watcher event error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }

                for path in event.paths {
                    if path.file_name().map(|n| n.to_os_string()) != file_name {
                        continue;
                    }
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    match projects::load_projects(&projects_file) {
                        Ok(reloaded) => {
                            tracing::info!(
                                projects = reloaded.len(),
                                "projects file changed; list reloaded",
                            );
                            *projects.write().await = reloaded;
                        }
                        Err(err) => {
                            tracing::warn!(
                                error = %err,
                                "projects file changed but could not be read; keeping previous list",
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    config: RuntimeConfig,
    projects: SharedProjects,
    statuses: Arc<RwLock<StatusMap>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&config.state_root);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&config.state_root);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let config = config.clone();
                let projects = projects.clone();
                let statuses = statuses.clone();
                let cycle_tx = cycle_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        config,
                        projects,
                        statuses,
                        cycle_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    config: RuntimeConfig,
    projects: SharedProjects,
    statuses: Arc<RwLock<StatusMap>>,
    cycle_tx: mpsc::Sender<CycleJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => {
                let payload = build_status_payload(
                    &config,
                    projects.clone(),
                    statuses.clone(),
                    started_at_unix,
                )
                .await;
                DaemonResponse::ok(payload)
            }
            "cycle" => match enqueue_cycle(&cycle_tx).await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    config: &RuntimeConfig,
    projects: SharedProjects,
    statuses: Arc<RwLock<StatusMap>>,
    started_at_unix: u64,
) -> Value {
    // Snapshot both locks up front; JSON assembly happens without them.
    let ids: Vec<String> = {
        let projects = projects.read().await;
        projects.iter().map(|p| p.id.to_string()).collect()
    };
    let status_snapshot: StatusMap = {
        let statuses = statuses.read().await;
        statuses.clone()
    };

    let projects_json: Vec<Value> = ids
        .iter()
        .map(|id| {
            let status = status_snapshot.get(id).cloned().unwrap_or_default();
            json!({
                "id": id,
                "last_version": status.last_version,
                "outcome": status.outcome,
                "failure_streak": status.failure_streak,
                "last_cycle_at_unix": status.last_cycle_at_unix,
            })
        })
        .collect();

    json!({
        "running": true,
        "label": DAEMON_LABEL,
        "role": config.role.to_string(),
        "started_at_unix": started_at_unix,
        "interval_secs": config.interval.as_secs(),
        "projects_file": config.projects_file.display().to_string(),
        "socket": socket_path(&config.state_root).display().to_string(),
        "projects": projects_json,
    })
}

async fn enqueue_cycle(cycle_tx: &mpsc::Sender<CycleJob>) -> Result<CycleSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    cycle_tx
        .send(CycleJob {
            trigger: "socket",
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("cycle response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn log_rotation_task(
    state_root: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let state_root = state_root.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_daemon_logs(&state_root);
                })
                .await
                .ok(); // rotation errors are logged inside; never crash the daemon
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn ensure_runtime_dirs(state_root: &Path) -> Result<(), DaemonError> {
    for dir in [
        state_dir(state_root),
        run_dir(state_root),
        logs_dir(state_root),
    ] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use gantry_core::version::VersionTag;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::{broadcast, mpsc, RwLock};
    use tokio::time::advance;

    use crate::poll::CycleStatus;

    use super::*;

    fn outcome(project: &str, status: CycleStatus) -> CycleOutcome {
        CycleOutcome {
            project: project.into(),
            status,
        }
    }

    fn v(raw: &str) -> VersionTag {
        VersionTag::parse(raw).expect(raw)
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_edits() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/etc/gantry/projects");
        let mut reloads = 0usize;

        for _ in 0..5 {
            if should_process_event_with_threshold(&mut debounce, &path, Instant::now(), threshold)
            {
                reloads += 1;
            }
            advance(Duration::from_millis(10)).await;
        }

        advance(Duration::from_millis(150)).await;
        assert_eq!(reloads, 1, "rapid saves should collapse to one reload");
    }

    #[test]
    fn streak_grows_on_failures_and_resets_on_success() {
        let mut map = StatusMap::new();
        let failed = || {
            outcome(
                "demo",
                CycleStatus::Failed {
                    version: v("v1.1.0"),
                    error: "push failed".to_owned(),
                },
            )
        };

        apply_outcomes(&mut map, &[failed()], 100);
        apply_outcomes(&mut map, &[failed()], 160);
        assert_eq!(map["demo"].failure_streak, 2);
        assert_eq!(map["demo"].outcome, "failed");

        apply_outcomes(&mut map, &[outcome("demo", CycleStatus::Updated(v("v1.1.0")))], 220);
        assert_eq!(map["demo"].failure_streak, 0);
        assert_eq!(map["demo"].last_version.as_deref(), Some("v1.1.0"));
        assert_eq!(map["demo"].outcome, "updated");
    }

    #[test]
    fn transient_unavailability_does_not_touch_the_streak() {
        let mut map = StatusMap::new();
        apply_outcomes(
            &mut map,
            &[outcome(
                "demo",
                CycleStatus::Failed {
                    version: v("v1.0.0"),
                    error: "x".to_owned(),
                },
            )],
            100,
        );
        apply_outcomes(
            &mut map,
            &[outcome("demo", CycleStatus::SourceUnavailable("down".to_owned()))],
            160,
        );
        assert_eq!(map["demo"].failure_streak, 1, "streak neither grew nor reset");
        assert_eq!(map["demo"].outcome, "source-unavailable");
    }

    #[test]
    fn summary_counts_updates_and_failures() {
        let outcomes = vec![
            outcome("a", CycleStatus::Updated(v("v1.0.0"))),
            outcome("b", CycleStatus::Unchanged),
            outcome(
                "c",
                CycleStatus::Failed {
                    version: v("v2.0.0"),
                    error: "x".to_owned(),
                },
            ),
        ];
        let summary = build_cycle_summary("interval", &outcomes, Duration::from_millis(42));
        assert_eq!(summary.projects, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.duration_ms, 42);
    }

    #[tokio::test]
    async fn status_payload_reports_projects_in_file_order() {
        let root = TempDir::new().unwrap();
        let config = RuntimeConfig {
            role: Role::Ci,
            state_root: root.path().to_path_buf(),
            projects_file: root.path().join("projects"),
            interval: Duration::from_secs(60),
        };

        let projects: SharedProjects = Arc::new(RwLock::new(vec![
            Project::new("beta", "https://git.example.com/beta.git"),
            Project::new("alpha", "https://git.example.com/alpha.git"),
        ]));
        let mut map = StatusMap::new();
        map.insert(
            "beta".to_owned(),
            ProjectStatus {
                last_version: Some("v1.2.0".to_owned()),
                outcome: "unchanged".to_owned(),
                failure_streak: 0,
                last_cycle_at_unix: 1_000_100,
            },
        );
        let statuses = Arc::new(RwLock::new(map));

        let payload = build_status_payload(&config, projects, statuses, 1_000_000).await;

        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["role"], json!("ci"));
        let listed = payload["projects"].as_array().expect("projects array");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["id"], json!("beta"), "file order, not sorted");
        assert_eq!(listed[0]["last_version"], json!("v1.2.0"));
        assert_eq!(listed[1]["id"], json!("alpha"));
        assert_eq!(listed[1]["outcome"], json!(""), "never polled yet");
    }

    #[tokio::test]
    async fn socket_protocol_status_and_stop_over_in_memory_channels() {
        let (request_tx, mut request_rx) = mpsc::channel::<Vec<u8>>(8);
        let (response_tx, mut response_rx) = mpsc::channel::<Vec<u8>>(8);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        tokio::spawn(async move {
            while let Some(bytes) = request_rx.recv().await {
                let line = String::from_utf8(bytes).expect("utf8");
                let request: DaemonRequest = serde_json::from_str(line.trim()).expect("request");
                let response = match request.cmd.as_str() {
                    "status" => DaemonResponse::ok(json!({"running": true})),
                    "stop" => {
                        let _ = shutdown_tx.send(());
                        DaemonResponse::ok(json!({"stopping": true}))
                    }
                    other => DaemonResponse::error(format!("unknown command '{other}'")),
                };
                let encoded = serde_json::to_vec(&response).expect("encode response");
                if response_tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });

        request_tx
            .send(br#"{"cmd":"status"}"#.to_vec())
            .await
            .expect("send status request");
        let status_response = response_rx.recv().await.expect("status response");
        let status_json: serde_json::Value =
            serde_json::from_slice(&status_response).expect("decode status");
        assert_eq!(status_json["ok"], serde_json::Value::Bool(true));

        request_tx
            .send(br#"{"cmd":"stop"}"#.to_vec())
            .await
            .expect("send stop request");
        let stop_response = response_rx.recv().await.expect("stop response");
        let stop_json: serde_json::Value =
            serde_json::from_slice(&stop_response).expect("decode stop");
        assert_eq!(stop_json["ok"], serde_json::Value::Bool(true));

        shutdown_rx.recv().await.expect("shutdown signal");
    }
}
