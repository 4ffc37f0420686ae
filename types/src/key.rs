//! Bundle key encodings.
//!
//! Block pools key every item (and a bundle's `to_key`) by plain height.
//! Snapshot pools use `height/chunkIndex`.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid height key {0:?}")]
    InvalidHeight(String),
    #[error("invalid snapshot key {0:?}, expected height/chunkIndex")]
    InvalidSnapshotKey(String),
}

/// Parse a block pool key into a height.
pub fn parse_block_key(key: &str) -> Result<u64, KeyError> {
    key.trim()
        .parse::<u64>()
        .map_err(|_| KeyError::InvalidHeight(key.to_string()))
}

/// Position of one chunk inside an archived state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotKey {
    pub height: u64,
    pub chunk_index: u64,
}

impl SnapshotKey {
    pub fn new(height: u64, chunk_index: u64) -> Self {
        Self { height, chunk_index }
    }

    /// Chunk 0 marks the start of a snapshot and carries its height.
    pub fn is_first_chunk(&self) -> bool {
        self.chunk_index == 0
    }
}

impl FromStr for SnapshotKey {
    type Err = KeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyError::InvalidSnapshotKey(key.to_string());

        let (height, chunk_index) = key.trim().split_once('/').ok_or_else(invalid)?;
        let height = height.parse::<u64>().map_err(|_| invalid())?;
        let chunk_index = chunk_index.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self { height, chunk_index })
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.chunk_index)
    }
}
