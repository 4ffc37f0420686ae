//! Registry and storage access.
//!
//! Both collaborators sit behind traits so that the walker, locator and
//! collector can run against in-memory fixtures.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use types::{BundlePage, FinalizedBundlesResponse, PageCursor, Pool, PoolResponse};

use crate::error::ArchiveError;
use crate::retry::RetryPolicy;

const REGISTRY_PREFIX: &str = "kyve/query/v1beta1";

/// Pool registry queried over its REST API.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch one page of a pool's finalized bundles, oldest first.
    async fn finalized_bundles(
        &self,
        pool_id: u64,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<BundlePage, ArchiveError>;

    async fn pool(&self, pool_id: u64) -> Result<Pool, ArchiveError>;
}

/// Content-addressed storage holding bundle bytes.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn fetch(&self, storage_provider_id: u32, storage_id: &str) -> Result<Vec<u8>, ArchiveError>;
}

#[async_trait]
impl<T: Registry + ?Sized> Registry for Arc<T> {
    async fn finalized_bundles(
        &self,
        pool_id: u64,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<BundlePage, ArchiveError> {
        (**self).finalized_bundles(pool_id, limit, cursor).await
    }

    async fn pool(&self, pool_id: u64) -> Result<Pool, ArchiveError> {
        (**self).pool(pool_id).await
    }
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn fetch(&self, storage_provider_id: u32, storage_id: &str) -> Result<Vec<u8>, ArchiveError> {
        (**self).fetch(storage_provider_id, storage_id).await
    }
}

async fn get_bytes(client: &Client, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, ArchiveError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|source| ArchiveError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if status.as_u16() == 404 {
        return Err(ArchiveError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(ArchiveError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| ArchiveError::Transport {
        url: url.to_string(),
        source,
    })?;

    Ok(body.to_vec())
}

/// Registry client over HTTP.
#[derive(Debug, Clone)]
pub struct RestRegistry {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

impl RestRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ArchiveError> {
        let client = Client::builder().build().map_err(ArchiveError::Client)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, ArchiveError> {
        let body = self
            .retry
            .run("registry query", || get_bytes(&self.client, url, query))
            .await?;

        serde_json::from_slice(&body).map_err(|err| ArchiveError::InvalidResponse {
            url: url.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl Registry for RestRegistry {
    async fn finalized_bundles(
        &self,
        pool_id: u64,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> Result<BundlePage, ArchiveError> {
        let url = format!("{}/{REGISTRY_PREFIX}/finalized_bundles/{pool_id}", self.base_url);

        let mut query = vec![("pagination.limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("pagination.key", cursor.as_str().to_string()));
        }

        debug!(pool_id, limit, cursor = ?cursor.map(PageCursor::as_str), "Fetching bundle page");

        let response: FinalizedBundlesResponse = self.get_json(&url, &query).await?;
        Ok(BundlePage::try_from(response)?)
    }

    async fn pool(&self, pool_id: u64) -> Result<Pool, ArchiveError> {
        let url = format!("{}/{REGISTRY_PREFIX}/pool/{pool_id}", self.base_url);
        let response: PoolResponse = self.get_json(&url, &[]).await.map_err(|err| match err {
            ArchiveError::NotFound(_) => ArchiveError::NotFound(format!("pool {pool_id}")),
            other => other,
        })?;

        Ok(response.pool)
    }
}

/// Storage client that reads bundles from the provider's HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpStorage {
    client: Client,
    gateway_override: Option<String>,
    retry: RetryPolicy,
}

impl HttpStorage {
    pub fn new() -> Result<Self, ArchiveError> {
        let client = Client::builder().build().map_err(ArchiveError::Client)?;

        Ok(Self {
            client,
            gateway_override: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Serve every provider from one gateway, e.g. a local mirror.
    pub fn with_gateway(mut self, base_url: impl Into<String>) -> Self {
        self.gateway_override = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url_for(&self, storage_provider_id: u32, storage_id: &str) -> Result<String, ArchiveError> {
        let gateway = match &self.gateway_override {
            Some(gateway) => gateway.as_str(),
            None => node_config::storage_gateway(storage_provider_id)
                .ok_or(ArchiveError::UnknownStorageProvider(storage_provider_id))?,
        };

        Ok(format!("{gateway}/{storage_id}"))
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn fetch(&self, storage_provider_id: u32, storage_id: &str) -> Result<Vec<u8>, ArchiveError> {
        let url = self.url_for(storage_provider_id, storage_id)?;
        debug!(%url, "Fetching bundle");

        self.retry
            .run("bundle fetch", || get_bytes(&self.client, &url, &[]))
            .await
    }
}
