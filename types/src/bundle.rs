use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::serde_utils::{quoted_u32, quoted_u64};

/// One keyed entry of a decoded bundle.
///
/// `value` is absent when the uploader could not archive the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl DataItem {
    pub fn new(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Ordered items of one archived bundle, keyed in increasing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    pub items: Vec<DataItem>,
}

impl Bundle {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<DataItem>> for Bundle {
    fn from(items: Vec<DataItem>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Bundle {
    type Item = DataItem;
    type IntoIter = std::vec::IntoIter<DataItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Registry metadata for a bundle that reached finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBundle {
    #[serde(with = "quoted_u64")]
    pub id: u64,
    pub storage_id: String,
    #[serde(with = "quoted_u32")]
    pub storage_provider_id: u32,
    #[serde(with = "quoted_u32")]
    pub compression_id: u32,
    pub from_key: String,
    pub to_key: String,
    /// Hex SHA-256 of the bytes stored under `storage_id`.
    pub data_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next_key: Option<String>,
}

/// Body of `GET .../finalized_bundles/{pool_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBundlesResponse {
    #[serde(default)]
    pub finalized_bundles: Vec<FinalizedBundle>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pagination key {0:?} is not valid base64")]
pub struct CursorError(pub String);

/// Opaque continuation token issued by the registry.
///
/// The registry hands out base64 of raw key bytes; the cursor is passed back
/// verbatim to fetch the following page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageCursor(String);

impl PageCursor {
    /// Interpret a `pagination.next_key`. Absent or empty keys end the index.
    pub fn from_next_key(next_key: Option<String>) -> Result<Option<Self>, CursorError> {
        match next_key {
            None => Ok(None),
            Some(key) if key.is_empty() => Ok(None),
            Some(key) => {
                STANDARD.decode(&key).map_err(|_| CursorError(key.clone()))?;
                Ok(Some(Self(key)))
            }
        }
    }

    pub fn from_raw(raw: impl AsRef<[u8]>) -> Self {
        Self(STANDARD.encode(raw))
    }

    pub fn to_raw(&self) -> Result<Vec<u8>, CursorError> {
        STANDARD.decode(&self.0).map_err(|_| CursorError(self.0.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of the bundle index plus the cursor of the page after it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlePage {
    pub bundles: Vec<FinalizedBundle>,
    pub next: Option<PageCursor>,
}

impl TryFrom<FinalizedBundlesResponse> for BundlePage {
    type Error = CursorError;

    fn try_from(response: FinalizedBundlesResponse) -> Result<Self, Self::Error> {
        let next = PageCursor::from_next_key(response.pagination.and_then(|p| p.next_key))?;

        Ok(Self {
            bundles: response.finalized_bundles,
            next,
        })
    }
}
