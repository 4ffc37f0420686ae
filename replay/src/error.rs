use std::io;
use std::path::PathBuf;

use node_config::ConfigError;
use types::KeyError;

use crate::states::EngineState;

/// Failures reported by an engine backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not started")]
    NotStarted,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt engine state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("failed to apply block {height}: {reason}")]
    ApplyFailed { height: u64, reason: String },

    #[error(transparent)]
    InvalidKey(#[from] KeyError),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of a replay session.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid replay transition from {from:?} to {to:?}")]
    InvalidTransition { from: EngineState, to: EngineState },

    #[error("engine {engine} failed to start: {source}")]
    StartFailed {
        engine: String,
        #[source]
        source: EngineError,
    },

    #[error("engine {engine} handshake failed: {source}")]
    HandshakeFailed {
        engine: String,
        #[source]
        source: EngineError,
    },

    #[error("engine {engine} failed to apply block {height}: {source}")]
    ApplyFailed {
        engine: String,
        height: u64,
        #[source]
        source: EngineError,
    },

    #[error("engine {engine} failed to stop: {source}")]
    StopFailed {
        engine: String,
        #[source]
        source: EngineError,
    },
}
