//! Spawns the target application, pumps its stdout/stderr to a configured
//! sink, and coordinates cross-platform termination and restart with the
//! update engine. Never touches the update engine directly — a scheduler
//! glues the two together.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no child process is running")]
    NotRunning,
    #[error("failed to reap child process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

/// Which stream a pumped line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Destination for the target's captured output. Child stdout and stderr
/// may interleave arbitrarily at byte granularity; no ordering between the
/// two streams is promised, only that each individual stream is delivered
/// in order.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, stream: Stream, line: &str);
}

/// In-memory sink useful for tests and embedding programs that want to
/// inspect output programmatically rather than just print it.
#[derive(Default)]
pub struct BufferingSink {
    lines: std::sync::Mutex<Vec<(Stream, String)>>,
}

impl BufferingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl OutputSink for BufferingSink {
    fn write_line(&self, stream: Stream, line: &str) {
        self.lines.lock().unwrap().push((stream, line.to_owned()));
    }
}

/// Prints to the process's own stdout/stderr, prefixed by stream.
pub struct PassthroughSink;

impl OutputSink for PassthroughSink {
    fn write_line(&self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => println!("{line}"),
            Stream::Stderr => eprintln!("{line}"),
        }
    }
}

/// Where the target executable lives and how to invoke it.
#[derive(Debug, Clone)]
pub struct TargetLayout {
    pub versions_root: PathBuf,
    pub executable_name: PathBuf,
    pub executable_args: Vec<String>,
}

impl TargetLayout {
    fn executable_path(&self, version: &str) -> PathBuf {
        self.versions_root.join(version).join(&self.executable_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopping,
    Exited,
}

/// The exit status of a reaped child, or the I/O error encountered while
/// reaping it. `Arc`-wrapped because `io::Error` isn't `Clone` and the
/// outcome may be observed by both `wait()` and a concurrent `stop()`.
type ExitOutcome = Result<std::process::ExitStatus, Arc<std::io::Error>>;

struct Inner {
    state: State,
    pid: Option<u32>,
    /// Set by `start()`, fed by the reaper task spawned alongside the
    /// child. Held here (not taken by `wait()`) so a concurrent `stop()`
    /// can still locate the pid and observe reap completion while
    /// another task is blocked awaiting this same channel.
    exit: Option<watch::Receiver<Option<ExitOutcome>>>,
}

/// Owns the child process handle. State transitions — and the pid/exit
/// channel needed to signal and reap the child — are serialized by a
/// single lock, which is never held across the blocking wait for exit:
/// the reaper task owns the `Child` itself, and callers only await a
/// `watch` channel it publishes into.
pub struct Supervisor {
    layout: TargetLayout,
    latest_version: Box<dyn Fn() -> Option<String> + Send + Sync>,
    sink: Arc<dyn OutputSink>,
    inner: Mutex<Inner>,
}

impl Supervisor {
    pub fn new(
        layout: TargetLayout,
        latest_version: impl Fn() -> Option<String> + Send + Sync + 'static,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            layout,
            latest_version: Box::new(latest_version),
            sink,
            inner: Mutex::new(Inner {
                state: State::Idle,
                pid: None,
                exit: None,
            }),
        }
    }

    /// Spawn the target at the current "latest" version and start pumping
    /// its stdout/stderr. Returns once the process is spawned; does not
    /// wait for exit.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let version = (self.latest_version)().ok_or(SupervisorError::Spawn {
            path: self.layout.executable_name.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no installed version to run",
            ),
        })?;
        let exe_path = self.layout.executable_path(&version);

        let mut command = Command::new(&exe_path);
        command
            .args(&self.layout.executable_args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            path: exe_path.clone(),
            source,
        })?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = self.sink.clone();
        if let Some(stdout) = stdout {
            let sink = sink.clone();
            tokio::spawn(pump_stream(stdout, Stream::Stdout, sink));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(pump_stream(stderr, Stream::Stderr, sink));
        }

        // The reaper task is the sole owner of `Child`; `wait()` and
        // `stop()` only ever observe this channel, so a concurrent
        // `stop()` can still find and signal the pid even while another
        // task is parked in `wait()`.
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let status = child.wait().await.map_err(Arc::new);
            let _ = exit_tx.send(Some(status));
        });

        let mut inner = self.inner.lock().await;
        inner.pid = pid;
        inner.exit = Some(exit_rx);
        inner.state = State::Running;
        info!(version, path = %exe_path.display(), "target started");
        Ok(())
    }

    /// Block until the running child exits, reaping it and transitioning
    /// to `Exited`. This is the run task's purpose — blocking here is
    /// expected.
    pub async fn wait(&self) -> Result<std::process::ExitStatus, SupervisorError> {
        let mut rx = {
            let inner = self.inner.lock().await;
            inner.exit.clone().ok_or(SupervisorError::NotRunning)?
        };
        let status = wait_for_exit(&mut rx).await?;
        let mut inner = self.inner.lock().await;
        inner.state = State::Exited;
        inner.pid = None;
        Ok(status)
    }

    /// Send the platform termination signal and await reap.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (pid, mut rx) = {
            let mut inner = self.inner.lock().await;
            let pid = match inner.pid {
                Some(pid) => pid,
                None => return Ok(()),
            };
            inner.state = State::Stopping;
            let rx = inner.exit.clone().ok_or(SupervisorError::NotRunning)?;
            (pid, rx)
        };

        if let Err(e) = terminate::terminate(pid) {
            warn!(pid, error = %e, "termination signal failed; child may be orphaned");
        }

        let result = wait_for_exit(&mut rx).await;
        let mut inner = self.inner.lock().await;
        inner.state = State::Exited;
        inner.pid = None;
        if let Err(e) = result {
            warn!(pid, error = %e, "failed to reap child after termination; nothing more to do");
        }
        Ok(())
    }

    /// Stop then start. If stop fails the error is surfaced and restart is
    /// aborted — the caller decides whether to attempt recovery.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.stop().await?;
        self.start().await
    }
}

/// Await the reaper task's published outcome on a cloned `watch` handle.
/// Multiple callers (the run task's `wait()` and a concurrent `stop()`)
/// can each hold their own clone and observe the same reap.
async fn wait_for_exit(
    rx: &mut watch::Receiver<Option<ExitOutcome>>,
) -> Result<std::process::ExitStatus, SupervisorError> {
    loop {
        if let Some(outcome) = rx.borrow().clone() {
            return outcome.map_err(|source| SupervisorError::Wait {
                source: std::io::Error::new(source.kind(), source.to_string()),
            });
        }
        if rx.changed().await.is_err() {
            return Err(SupervisorError::NotRunning);
        }
    }
}

async fn pump_stream<R>(reader: R, stream: Stream, sink: Arc<dyn OutputSink>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => sink.write_line(stream, &line),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, ?stream, "error reading child output stream");
                break;
            }
        }
    }
}

#[cfg(unix)]
mod terminate {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    pub fn terminate(pid: u32) -> std::io::Result<()> {
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
    }
}

#[cfg(windows)]
mod terminate {
    // Signal delivery is unreliable for processes spawned by services on
    // Windows; shell out to taskkill instead. Production-tested workaround.
    pub fn terminate(pid: u32) -> std::io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "taskkill exited with status {status}"
            )))
        }
    }
}
