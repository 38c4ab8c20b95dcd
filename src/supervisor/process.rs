//! Worker process management
//!
//! Workers are separate OS processes: the supervisor re-executes its own
//! binary in `worker` mode. The traits here are the seam the supervisor is
//! tested through.

use async_trait::async_trait;
use futures::future::join_all;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// How long output forwarders may keep reading after the worker exited
const FORWARD_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Observed state of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited with this code (`None` when killed by a signal)
    Exited(Option<i32>),
}

/// What a new worker is launched with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    pub worker_id: String,
    pub session: String,
    pub institution_id: Option<String>,
}

/// A running worker process
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check
    fn poll_state(&mut self) -> ProcessState;

    /// Sends the graceful stop signal
    fn terminate(&mut self) -> io::Result<()>;

    /// Waits for the process to exit
    async fn wait_exit(&mut self) -> io::Result<Option<i32>>;

    /// Force-kills the process
    fn kill(&mut self) -> io::Result<()>;

    /// Releases the process I/O handles once buffered output is forwarded
    async fn release(&mut self);
}

/// Starts worker processes
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerProcess>>;
}

/// Launches workers by re-executing a binary in `worker` mode
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config_path: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            config_path,
        }
    }

    /// Launcher for the currently running executable
    pub fn current_exe(config_path: Option<PathBuf>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, config_path))
    }

    /// Command-line arguments for one worker
    pub fn worker_args(&self, spec: &WorkerSpec) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.config_path {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args.push("worker".to_string());
        args.push("--worker-id".to_string());
        args.push(spec.worker_id.clone());
        args.push("--session".to_string());
        args.push(spec.session.clone());
        if let Some(institution_id) = &spec.institution_id {
            args.push("--institution-id".to_string());
            args.push(institution_id.clone());
        }
        args
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerProcess>> {
        let mut command = Command::new(&self.program);
        command.args(self.worker_args(spec));
        Ok(Box::new(spawn_forwarded(command, &spec.worker_id)?))
    }
}

/// Spawns `command` with its stdout and stderr re-logged under `worker_id`
fn spawn_forwarded(mut command: Command, worker_id: &str) -> io::Result<ChildProcess> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut forwarders = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        forwarders.push(forward_lines(stdout, worker_id.to_string(), false));
    }
    if let Some(stderr) = child.stderr.take() {
        forwarders.push(forward_lines(stderr, worker_id.to_string(), true));
    }

    Ok(ChildProcess { child, forwarders })
}

/// Re-logs a worker's output stream line by line
fn forward_lines<R>(reader: R, worker_id: String, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) if is_stderr => tracing::warn!("[worker {}] {}", worker_id, line),
                Ok(Some(line)) => tracing::info!("[worker {}] {}", worker_id, line),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Output of worker {} unreadable: {}", worker_id, e);
                    break;
                }
            }
        }
    })
}

struct ChildProcess {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn poll_state(&mut self) -> ProcessState {
        match self.child.try_wait() {
            Ok(None) => ProcessState::Running,
            Ok(Some(status)) => ProcessState::Exited(status.code()),
            Err(e) => {
                tracing::warn!("Failed to poll worker process: {}", e);
                ProcessState::Exited(None)
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait_exit(&mut self) -> io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn release(&mut self) {
        // bounded: a grandchild may still hold a pipe open
        let drained = join_all(self.forwarders.iter_mut());
        if tokio::time::timeout(FORWARD_DRAIN_TIMEOUT, drained).await.is_err() {
            tracing::debug!("Worker output still open after {:?}", FORWARD_DRAIN_TIMEOUT);
        }
        for forwarder in self.forwarders.drain(..) {
            if !forwarder.is_finished() {
                forwarder.abort();
            }
        }
        self.child.stdin.take();
        self.child.stdout.take();
        self.child.stderr.take();
    }
}
