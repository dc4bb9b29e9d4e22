//! External command execution with explicit timeouts and bounded retries.
//!
//! Every remote operation in the pipelines (clone, fetch, push, pull, scp)
//! runs through here so that one unreachable dependency can never stall a
//! poll loop indefinitely. The retry budget is local to a single call and
//! distinct from the outer poll interval.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Default per-command timeout; long enough for a routine clone or push.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully described external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    stdin: Option<String>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Pipe `input` to the child's stdin (e.g. `docker login --password-stdin`).
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {seconds}s")]
    TimedOut { program: String, seconds: u64 },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Run a command to completion, killing it once the timeout elapses.
///
/// stdout/stderr are drained on reader threads while the parent polls
/// `try_wait`, so a chatty child can never deadlock on a full pipe.
pub fn run(spec: &CommandSpec) -> Result<ExecOutput, ExecError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &spec.cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| ExecError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    if let Some(input) = &spec.stdin {
        if let Some(mut pipe) = child.stdin.take() {
            use std::io::Write;
            let _ = pipe.write_all(input.as_bytes());
            // Dropping the handle closes the pipe so the child sees EOF.
        }
    }

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = wait_with_timeout(&mut child, spec)?;

    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    if status_success(&status) {
        Ok(ExecOutput { stdout, stderr })
    } else {
        Err(ExecError::Failed {
            program: spec.program.clone(),
            status: status_label(&status),
            stderr: stderr.trim().to_owned(),
        })
    }
}

fn wait_with_timeout(
    child: &mut Child,
    spec: &CommandSpec,
) -> Result<std::process::ExitStatus, ExecError> {
    let deadline = Instant::now() + spec.timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecError::TimedOut {
                        program: spec.program.clone(),
                        seconds: spec.timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(ExecError::Spawn {
                    program: spec.program.clone(),
                    source,
                })
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> Option<std::thread::JoinHandle<String>> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = reader.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn status_success(status: &std::process::ExitStatus) -> bool {
    status.success()
}

fn status_label(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("status {code}"),
        None => "signal".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Capped exponential backoff for remote operations: `attempts` tries with
/// delays of `base_delay * 2^n` between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the command exactly once.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Run `spec` until it succeeds or the attempt budget is spent; returns
    /// the last error when every attempt failed.
    pub fn run(&self, spec: &CommandSpec) -> Result<ExecOutput, ExecError> {
        let attempts = self.attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }
            match run(spec) {
                Ok(output) => return Ok(output),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.expect("at least one attempt was made"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
