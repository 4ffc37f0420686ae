//! In-memory registry and storage for exercising the pipeline offline.
//!
//! Cursors issued by [`MockRegistry`] are base64 of the next page offset, the
//! same shape the real registry uses for its raw keys.
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use serde_json::{json, Value};
use types::{BundlePage, DataItem, FinalizedBundle, PageCursor, Pool, PoolData};

use crate::client::{Registry, Storage};
use crate::codec::BundleCodec;
use crate::error::ArchiveError;

pub const BLOCK_RUNTIME: &str = "@kyvejs/tendermint-bsync";
pub const SNAPSHOT_RUNTIME: &str = "@kyvejs/tendermint-ssync";

pub fn block_value(height: u64) -> Value {
    json!({
        "header": {
            "chain_id": "ksync-test",
            "height": height.to_string(),
        },
        "data": {"txs": []},
        "last_commit": {"height": height.saturating_sub(1).to_string()},
    })
}

pub fn block_items(from: u64, to: u64) -> Vec<DataItem> {
    (from..=to)
        .map(|height| DataItem::new(height.to_string(), Some(block_value(height))))
        .collect()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("in-memory write");
    encoder.finish().expect("in-memory gzip")
}

/// Serialize and gzip items the way an uploader stores them.
pub fn encode_items(items: &[DataItem]) -> Vec<u8> {
    gzip(&serde_json::to_vec(items).expect("items serialize"))
}

#[derive(Default)]
pub struct MockRegistry {
    pools: Mutex<HashMap<u64, Pool>>,
    bundles: Mutex<HashMap<u64, Vec<FinalizedBundle>>>,
    page_requests: AtomicUsize,
    unavailable: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pool(&self, pool_id: u64, runtime: &str, start_key: &str, current_key: &str) {
        let pool = Pool {
            id: pool_id,
            data: PoolData {
                name: format!("pool-{pool_id}"),
                runtime: runtime.to_string(),
                start_key: start_key.to_string(),
                current_key: current_key.to_string(),
            },
        };
        self.pools.lock().unwrap().insert(pool_id, pool);
    }

    pub fn add_bundle(&self, pool_id: u64, bundle: FinalizedBundle) {
        self.bundles.lock().unwrap().entry(pool_id).or_default().push(bundle);
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    /// Make every following page request fail with a 503.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Registry for MockRegistry {
    async fn finalized_bundles(
        &self,
        pool_id: u64,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<BundlePage, ArchiveError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ArchiveError::UnexpectedStatus {
                url: format!("mock://finalized_bundles/{pool_id}"),
                status: 503,
            });
        }

        let offset = match cursor {
            None => 0,
            Some(cursor) => {
                let raw = cursor.to_raw()?;
                String::from_utf8_lossy(&raw)
                    .parse::<usize>()
                    .map_err(|err| ArchiveError::InvalidResponse {
                        url: "mock://cursor".to_string(),
                        reason: err.to_string(),
                    })?
            }
        };

        let bundles = self.bundles.lock().unwrap();
        let all = bundles.get(&pool_id).map(Vec::as_slice).unwrap_or_default();
        let end = (offset + limit as usize).min(all.len());
        let page = all.get(offset..end).unwrap_or_default().to_vec();
        let next = (end < all.len()).then(|| PageCursor::from_raw(end.to_string()));

        Ok(BundlePage { bundles: page, next })
    }

    async fn pool(&self, pool_id: u64) -> Result<Pool, ArchiveError> {
        self.pools
            .lock()
            .unwrap()
            .get(&pool_id)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(format!("pool {pool_id}")))
    }
}

#[derive(Default)]
struct StorageInner {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct MockStorage {
    inner: Arc<StorageInner>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, storage_id: impl Into<String>, bytes: Vec<u8>) {
        self.inner.blobs.lock().unwrap().insert(storage_id.into(), bytes);
    }

    /// Storage ids in the order they were fetched.
    pub fn fetched(&self) -> Vec<String> {
        self.inner.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn fetch(&self, _storage_provider_id: u32, storage_id: &str) -> Result<Vec<u8>, ArchiveError> {
        self.inner.fetched.lock().unwrap().push(storage_id.to_string());
        self.inner
            .blobs
            .lock()
            .unwrap()
            .get(storage_id)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound(format!("mock://{storage_id}")))
    }
}

/// Registry and storage populated together.
#[derive(Clone, Default)]
pub struct MockArchive {
    pub registry: Arc<MockRegistry>,
    pub storage: MockStorage,
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_id(pool_id: u64, bundle_id: u64) -> String {
        format!("bundle-{pool_id}-{bundle_id}")
    }

    /// Register a bundle and store `bytes` for it as-is, checksummed over
    /// `checksum_of`.
    pub fn add_raw_bundle(
        &self,
        pool_id: u64,
        bundle_id: u64,
        from_key: &str,
        to_key: &str,
        compression_id: u32,
        bytes: Vec<u8>,
        checksum_of: &[u8],
    ) -> FinalizedBundle {
        let bundle = FinalizedBundle {
            id: bundle_id,
            storage_id: Self::storage_id(pool_id, bundle_id),
            storage_provider_id: 3,
            compression_id,
            from_key: from_key.to_string(),
            to_key: to_key.to_string(),
            data_hash: BundleCodec::checksum(checksum_of),
        };
        self.storage.put(bundle.storage_id.clone(), bytes);
        self.registry.add_bundle(pool_id, bundle.clone());
        bundle
    }

    pub fn add_items_bundle(&self, pool_id: u64, bundle_id: u64, items: &[DataItem]) -> FinalizedBundle {
        let bytes = encode_items(items);
        let from_key = items.first().map(|item| item.key.as_str()).unwrap_or_default();
        let to_key = items.last().map(|item| item.key.as_str()).unwrap_or_default();
        self.add_raw_bundle(pool_id, bundle_id, from_key, to_key, 1, bytes.clone(), &bytes)
    }

    pub fn add_block_bundle(&self, pool_id: u64, bundle_id: u64, from: u64, to: u64) -> FinalizedBundle {
        self.add_items_bundle(pool_id, bundle_id, &block_items(from, to))
    }

    /// Snapshot bundles are only ever looked up, so no bytes are stored.
    pub fn add_snapshot_bundle(&self, pool_id: u64, bundle_id: u64, height: u64, chunk_index: u64) {
        self.registry.add_bundle(
            pool_id,
            FinalizedBundle {
                id: bundle_id,
                storage_id: Self::storage_id(pool_id, bundle_id),
                storage_provider_id: 3,
                compression_id: 1,
                from_key: format!("{height}/{chunk_index}"),
                to_key: format!("{height}/{chunk_index}"),
                data_hash: String::new(),
            },
        );
    }
}
