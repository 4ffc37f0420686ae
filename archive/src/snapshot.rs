use futures::{pin_mut, TryStreamExt};
use tracing::{debug, info};
use types::{FinalizedBundle, SnapshotKey};

use crate::client::Registry;
use crate::error::ArchiveError;
use crate::index::BundleIndex;

/// Bundle holding chunk 0 of a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLocation {
    pub bundle_id: u64,
    pub snapshot_height: u64,
}

/// Looks up snapshot boundaries in a snapshot pool.
///
/// Snapshot pools key bundles by `height/chunkIndex`. Only the first chunk
/// matters here: it is the one that pins a snapshot to its height.
pub struct SnapshotLocator<'a, R: ?Sized> {
    registry: &'a R,
    pool_id: u64,
    page_limit: u32,
}

impl<'a, R: Registry + ?Sized> SnapshotLocator<'a, R> {
    pub fn new(registry: &'a R, pool_id: u64, page_limit: u32) -> Self {
        Self {
            registry,
            pool_id,
            page_limit,
        }
    }

    /// Latest snapshot at or below `target_height`.
    ///
    /// The walk stops at the first bundle above the target; later pages are
    /// never requested.
    pub async fn find_nearest(&self, target_height: u64) -> Result<SnapshotLocation, ArchiveError> {
        let mut candidate: Option<SnapshotLocation> = None;

        self.walk(|key, bundle| {
            if key.height > target_height {
                return Walk::Stop;
            }
            if key.is_first_chunk() {
                candidate = Some(SnapshotLocation {
                    bundle_id: bundle.id,
                    snapshot_height: key.height,
                });
            }
            Walk::Continue
        })
        .await?;

        match candidate {
            Some(location) => {
                info!(
                    pool_id = self.pool_id,
                    target_height,
                    snapshot_height = location.snapshot_height,
                    bundle_id = location.bundle_id,
                    "Found nearest snapshot"
                );
                Ok(location)
            }
            None => Err(ArchiveError::NotFound(format!(
                "snapshot at or below height {target_height} in pool {}",
                self.pool_id
            ))),
        }
    }

    /// Snapshot taken at exactly `snapshot_height`.
    pub async fn find_exact(&self, snapshot_height: u64) -> Result<SnapshotLocation, ArchiveError> {
        let mut found: Option<SnapshotLocation> = None;

        self.walk(|key, bundle| {
            if key.height > snapshot_height {
                return Walk::Stop;
            }
            if key.height == snapshot_height && key.is_first_chunk() {
                found = Some(SnapshotLocation {
                    bundle_id: bundle.id,
                    snapshot_height,
                });
                return Walk::Stop;
            }
            Walk::Continue
        })
        .await?;

        found.ok_or_else(|| {
            ArchiveError::NotFound(format!(
                "snapshot at height {snapshot_height} in pool {}",
                self.pool_id
            ))
        })
    }

    async fn walk<F>(&self, mut visit: F) -> Result<(), ArchiveError>
    where
        F: FnMut(SnapshotKey, &FinalizedBundle) -> Walk,
    {
        let pages = BundleIndex::new(self.registry, self.pool_id, self.page_limit).into_pages();
        pin_mut!(pages);

        while let Some(page) = pages.try_next().await? {
            for bundle in &page.bundles {
                let key: SnapshotKey = bundle.to_key.parse()?;
                if let Walk::Stop = visit(key, bundle) {
                    debug!(pool_id = self.pool_id, key = %key, "Snapshot walk stopped");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

enum Walk {
    Continue,
    Stop,
}
