use archive::ArchiveError;
use replay::{EngineError, ReplayError};
use supervisor::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("pool {pool_id} has runtime {runtime}, supported runtimes are {supported:?}")]
    RuntimeMismatch {
        pool_id: u64,
        runtime: String,
        supported: Vec<String>,
    },

    #[error("pool {pool_id} reports key {key:?} the engine cannot read: {source}")]
    InvalidPoolKey {
        pool_id: u64,
        key: String,
        #[source]
        source: EngineError,
    },

    #[error("no engine available")]
    NoCompatibleEngine,

    #[error("target height {target} is not above start height {start}")]
    TargetNotAhead { start: u64, target: u64 },

    #[error("starting from a snapshot requires a target height")]
    TargetRequired,

    #[error("block collector aborted: {0}")]
    CollectorAborted(String),
}

impl SyncError {
    /// Lookup misses, reported to the user rather than treated as a crash.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Archive(err) if err.is_not_found())
    }
}
