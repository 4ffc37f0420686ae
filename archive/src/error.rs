use std::io;

use types::{BlockError, CursorError, KeyError};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("failed to decompress bundle: {0}")]
    DecompressionFailed(#[source] io::Error),

    #[error("failed to decode bundle: {0}")]
    DecodeFailed(String),

    #[error("unsupported compression id {0}")]
    UnsupportedCompression(u32),

    #[error("unknown storage provider id {0}")]
    UnknownStorageProvider(u32),

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("item at height {current} follows height {previous}")]
    OutOfOrder { previous: u64, current: u64 },
}

impl ArchiveError {
    /// Failures that may succeed when the same request is repeated.
    ///
    /// Integrity failures are never transient: the bytes behind a storage id
    /// do not change.
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::Transport { .. } => true,
            ArchiveError::UnexpectedStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }

    /// Short label used for the fetch result metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveError::Client(_) => "client",
            ArchiveError::Transport { .. } => "transport",
            ArchiveError::UnexpectedStatus { .. } => "status",
            ArchiveError::InvalidResponse { .. } => "invalid_response",
            ArchiveError::ChecksumMismatch { .. } => "checksum_mismatch",
            ArchiveError::DecompressionFailed(_) => "decompression_failed",
            ArchiveError::DecodeFailed(_) => "decode_failed",
            ArchiveError::UnsupportedCompression(_) => "unsupported_compression",
            ArchiveError::UnknownStorageProvider(_) => "unknown_storage_provider",
            ArchiveError::InvalidKey(_) => "invalid_key",
            ArchiveError::NotFound(_) => "not_found",
            ArchiveError::OutOfOrder { .. } => "out_of_order",
        }
    }
}

impl From<BlockError> for ArchiveError {
    fn from(err: BlockError) -> Self {
        ArchiveError::DecodeFailed(err.to_string())
    }
}

impl From<CursorError> for ArchiveError {
    fn from(err: CursorError) -> Self {
        ArchiveError::InvalidResponse {
            url: "pagination".to_string(),
            reason: err.to_string(),
        }
    }
}
