use archive::{Registry, SnapshotLocation, SnapshotLocator};

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotQuery {
    /// Latest snapshot at or below the height.
    Nearest(u64),
    /// Snapshot taken at exactly the height.
    Exact(u64),
}

pub async fn find_snapshot<R: Registry + ?Sized>(
    registry: &R,
    snapshot_pool_id: u64,
    query: SnapshotQuery,
    page_limit: u32,
) -> Result<SnapshotLocation, SyncError> {
    let locator = SnapshotLocator::new(registry, snapshot_pool_id, page_limit);
    let location = match query {
        SnapshotQuery::Nearest(height) => locator.find_nearest(height).await?,
        SnapshotQuery::Exact(height) => locator.find_exact(height).await?,
    };
    Ok(location)
}
