use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use node_config::DEFAULT_STOP_GRACE_SECS;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::process::{Child, Command};
use tracing::{debug, info, info_span, warn, Span};

use crate::error::ProcessError;
use crate::mode::StartMode;

/// Send a termination signal to `pid`.
///
/// A process that cannot be found or signalled is an error: a node left
/// running keeps writing into the data directory.
pub fn stop_pid(pid: u32) -> Result<(), ProcessError> {
    let sys_pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));

    let process = system.process(sys_pid).ok_or(ProcessError::NotRunning { pid })?;
    match process.kill_with(Signal::Term) {
        Some(true) => Ok(()),
        Some(false) => Err(ProcessError::Signal {
            pid,
            reason: "signal delivery failed".to_string(),
        }),
        None => Err(ProcessError::Signal {
            pid,
            reason: "SIGTERM is not supported on this platform".to_string(),
        }),
    }
}

/// Starts the node binary for one home directory.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    binary: PathBuf,
    home: PathBuf,
    stop_grace: Duration,
    inherit_output: bool,
    span: Span,
}

impl ProcessSupervisor {
    pub fn new(binary: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let home = home.into();
        let span = info_span!("supervisor", binary = %binary.display());
        Self {
            binary,
            home,
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            inherit_output: false,
            span,
        }
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Pass the node's stdout and stderr through instead of discarding them.
    pub fn with_inherited_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn start_for_database_access(&self) -> Result<ProcessHandle, ProcessError> {
        self.start(StartMode::DatabaseOnly)
    }

    pub fn start_for_isolated_network(&self) -> Result<ProcessHandle, ProcessError> {
        self.start(StartMode::IsolatedNetwork)
    }

    pub fn start(&self, mode: StartMode) -> Result<ProcessHandle, ProcessError> {
        let output = || {
            if self.inherit_output {
                Stdio::inherit()
            } else {
                Stdio::null()
            }
        };

        let child = Command::new(&self.binary)
            .args(mode.args(&self.home))
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => ProcessError::BinaryNotFound(self.binary.clone()),
                _ => ProcessError::Spawn {
                    binary: self.binary.clone(),
                    source,
                },
            })?;

        let pid = child.id().ok_or(ProcessError::NotRunning { pid: 0 })?;
        info!(parent: &self.span, pid, mode = mode.as_str(), home = %self.home.display(), "Node binary started");

        Ok(ProcessHandle {
            child,
            pid,
            mode,
            stop_grace: self.stop_grace,
            stopped: false,
            span: self.span.clone(),
        })
    }
}

/// A running node binary owned by the session.
///
/// Must be stopped with [`ProcessHandle::stop`]; dropping a live handle
/// leaves the process running and is logged.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    mode: StartMode,
    stop_grace: Duration,
    stopped: bool,
    span: Span,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn mode(&self) -> StartMode {
        self.mode
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the process and wait for it to exit.
    ///
    /// The wait is bounded by the stop grace period. A process still alive
    /// after the grace period is killed and reported as [`ProcessError::StopTimeout`].
    pub async fn stop(&mut self) -> Result<ExitStatus, ProcessError> {
        let pid = self.pid;
        if self.stopped {
            return Err(ProcessError::NotRunning { pid });
        }

        if let Some(status) = self
            .child
            .try_wait()
            .map_err(|source| ProcessError::Wait { pid, source })?
        {
            self.stopped = true;
            warn!(parent: &self.span, pid, %status, "Node binary exited before stop");
            return Err(ProcessError::ExitedEarly { pid, status });
        }

        debug!(parent: &self.span, pid, "Sending SIGTERM");
        stop_pid(pid)?;

        match tokio::time::timeout(self.stop_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.stopped = true;
                info!(parent: &self.span, pid, %status, "Node binary stopped");
                Ok(status)
            }
            Ok(Err(source)) => Err(ProcessError::Wait { pid, source }),
            Err(_) => {
                warn!(parent: &self.span, pid, grace = ?self.stop_grace, "Node binary ignored SIGTERM, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|source| ProcessError::Wait { pid, source })?;
                self.stopped = true;
                Err(ProcessError::StopTimeout {
                    pid,
                    grace: self.stop_grace,
                })
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.stopped {
            warn!(
                parent: &self.span,
                pid = self.pid,
                mode = self.mode.as_str(),
                "Process handle dropped while the node may still be running"
            );
        }
    }
}
