//! Sync orchestration: ties archive retrieval, replay and the node process
//! together into one session.
mod block_sync;
mod error;
mod lookup;

pub use block_sync::{BlockSync, StartHeight, SyncOptions, SyncReport};
pub use error::SyncError;
pub use lookup::{find_snapshot, SnapshotQuery};
