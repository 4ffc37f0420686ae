use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("node binary {0} not found")]
    BinaryNotFound(PathBuf),

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("process {pid} is not running")]
    NotRunning { pid: u32 },

    #[error("process {pid} exited before it was stopped ({status})")]
    ExitedEarly { pid: u32, status: ExitStatus },

    #[error("process {pid} did not exit within {grace:?} and was killed")]
    StopTimeout { pid: u32, grace: Duration },

    #[error("failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}
