use serde::{Deserialize, Serialize};

use crate::serde_utils::quoted_u64;

/// Body of `GET .../pool/{pool_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResponse {
    pub pool: Pool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    #[serde(with = "quoted_u64")]
    pub id: u64,
    pub data: PoolData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolData {
    #[serde(default)]
    pub name: String,
    /// Data format of the pool, e.g. `@kyvejs/tendermint-bsync`.
    pub runtime: String,
    #[serde(default)]
    pub start_key: String,
    #[serde(default)]
    pub current_key: String,
}

impl Pool {
    pub fn runtime(&self) -> &str {
        &self.data.runtime
    }
}
