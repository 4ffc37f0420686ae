//! Retrieval side of the sync pipeline.
//!
//! - **Client**: registry (bundle index, pool metadata) and storage access
//! - **Codec**: checksum, decompression and decoding of fetched bundles
//! - **Index**: paginated walk over a pool's finalized bundles
//! - **Snapshot**: locating the bundle that opens a state snapshot
//! - **Collector**: turning block bundles into an ordered stream of block pairs
pub mod client;
pub mod codec;
pub mod collector;
pub mod error;
pub mod index;
pub mod retry;
pub mod snapshot;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{HttpStorage, Registry, RestRegistry, Storage};
pub use codec::BundleCodec;
pub use collector::{BlockCollector, CollectorConfig, CollectorOutcome, CollectorSummary, PairResult};
pub use error::ArchiveError;
pub use index::BundleIndex;
pub use retry::RetryPolicy;
pub use snapshot::{SnapshotLocation, SnapshotLocator};
