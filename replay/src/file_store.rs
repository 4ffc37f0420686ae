//! Reference engine that keeps applied blocks as JSON files.
//!
//! Layout under the node's data directory:
//!
//! ```text
//! {data_dir}/ksync/blocks/{height}.json
//! {data_dir}/ksync/state.json
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! crash leaves either the previous or the new version, never a torn one.
//! The block file is written before the state file: after a crash the state
//! may lag the blocks on disk, but never points at a missing block.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use node_config::HomeConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use types::{parse_block_key, BlockPair};

use crate::engine::{ApplyOutcome, Engine};
use crate::error::EngineError;

const STORE_DIR: &str = "ksync";
const BLOCKS_DIR: &str = "blocks";
const STATE_FILE: &str = "state.json";

const RUNTIMES: &[&str] = &["@kyvejs/tendermint", "@kyvejs/tendermint-bsync"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreState {
    continuation_height: u64,
}

#[derive(Debug, Default)]
pub struct FileStoreEngine {
    store: Option<PathBuf>,
    state: StoreState,
}

impl FileStoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store directory inside a node home, as resolved from its config.
    pub fn store_dir(home: &HomeConfig) -> PathBuf {
        home.data_dir().join(STORE_DIR)
    }

    pub fn block_path(store: &Path, height: u64) -> PathBuf {
        store.join(BLOCKS_DIR).join(format!("{height}.json"))
    }

    fn store(&self) -> Result<&Path, EngineError> {
        self.store.as_deref().ok_or(EngineError::NotStarted)
    }

    async fn read_state(store: &Path) -> Result<StoreState, EngineError> {
        let path = store.join(STATE_FILE);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| EngineError::CorruptState {
                path,
                reason: err.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
            Err(err) => Err(EngineError::io(path, err)),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)
        .await
        .map_err(|err| EngineError::io(&tmp, err))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|err| EngineError::io(path, err))
}

#[async_trait]
impl Engine for FileStoreEngine {
    fn name(&self) -> &str {
        "file-store"
    }

    fn compatible_runtimes(&self) -> &[&str] {
        RUNTIMES
    }

    fn parse_height_from_key(&self, key: &str) -> Result<u64, EngineError> {
        Ok(parse_block_key(key)?)
    }

    async fn start_engine(&mut self, home: &Path) -> Result<(), EngineError> {
        let config = HomeConfig::load(home)?;
        let store = Self::store_dir(&config);
        let blocks = store.join(BLOCKS_DIR);
        fs::create_dir_all(&blocks)
            .await
            .map_err(|err| EngineError::io(&blocks, err))?;

        self.state = Self::read_state(&store).await?;
        info!(
            store = %store.display(),
            db_backend = %config.node.db_backend,
            continuation_height = self.state.continuation_height,
            "File store opened"
        );
        self.store = Some(store);
        Ok(())
    }

    async fn stop_engine(&mut self) -> Result<(), EngineError> {
        if let Some(store) = self.store.take() {
            debug!(store = %store.display(), "File store closed");
        }
        Ok(())
    }

    async fn continuation_height(&self) -> Result<u64, EngineError> {
        self.store()?;
        Ok(self.state.continuation_height)
    }

    async fn do_handshake(&mut self) -> Result<(), EngineError> {
        let store = self.store()?;
        let height = self.state.continuation_height;
        if height == 0 {
            return Ok(());
        }

        let path = Self::block_path(store, height);
        if !fs::try_exists(&path)
            .await
            .map_err(|err| EngineError::io(&path, err))?
        {
            return Err(EngineError::HandshakeFailed(format!(
                "continuation block {height} missing at {}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn apply_block(&mut self, pair: &BlockPair) -> Result<ApplyOutcome, EngineError> {
        let store = self.store()?.to_path_buf();
        let height = pair.height();
        let continuation = self.state.continuation_height;

        if height <= continuation {
            return Ok(ApplyOutcome::AlreadyApplied);
        }
        if continuation != 0 && pair.first.height != continuation {
            return Err(EngineError::ApplyFailed {
                height,
                reason: format!("block does not extend continuation height {continuation}"),
            });
        }

        write_atomic(&Self::block_path(&store, height), &pair.second.to_bytes()).await?;

        let next = StoreState {
            continuation_height: height,
        };
        let state = serde_json::to_vec(&next).map_err(|err| EngineError::ApplyFailed {
            height,
            reason: err.to_string(),
        })?;
        write_atomic(&store.join(STATE_FILE), &state).await?;
        self.state = next;

        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use types::Block;

    fn pair(height: u64) -> BlockPair {
        let block = |h: u64| Block::from_value(json!({"header": {"height": h.to_string()}})).unwrap();
        BlockPair::new(block(height - 1), block(height)).unwrap()
    }

    async fn started(home: &Path) -> FileStoreEngine {
        let mut engine = FileStoreEngine::new();
        engine.start_engine(home).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_requires_start() {
        let mut engine = FileStoreEngine::new();
        assert!(matches!(engine.continuation_height().await, Err(EngineError::NotStarted)));
        assert!(matches!(engine.apply_block(&pair(2)).await, Err(EngineError::NotStarted)));
    }

    #[tokio::test]
    async fn test_apply_persists_block_and_height() {
        let home = tempfile::tempdir().unwrap();
        let mut engine = started(home.path()).await;

        assert_eq!(engine.continuation_height().await.unwrap(), 0);
        assert_eq!(engine.apply_block(&pair(5)).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(engine.apply_block(&pair(6)).await.unwrap(), ApplyOutcome::Applied);

        let store = home.path().join("data").join(STORE_DIR);
        assert!(FileStoreEngine::block_path(&store, 6).exists());
        assert!(!store.join("blocks").join("6.tmp").exists());

        let reopened = started(home.path()).await;
        assert_eq!(reopened.continuation_height().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_apply_at_or_below_continuation_is_noop() {
        let home = tempfile::tempdir().unwrap();
        let mut engine = started(home.path()).await;
        engine.apply_block(&pair(3)).await.unwrap();
        engine.apply_block(&pair(4)).await.unwrap();

        assert_eq!(engine.apply_block(&pair(4)).await.unwrap(), ApplyOutcome::AlreadyApplied);
        assert_eq!(engine.apply_block(&pair(2)).await.unwrap(), ApplyOutcome::AlreadyApplied);
        assert_eq!(engine.continuation_height().await.unwrap(), 4);
        assert!(!FileStoreEngine::block_path(&home.path().join("data/ksync"), 2).exists());
    }

    #[tokio::test]
    async fn test_rejects_gap_after_continuation() {
        let home = tempfile::tempdir().unwrap();
        let mut engine = started(home.path()).await;
        engine.apply_block(&pair(3)).await.unwrap();

        let err = engine.apply_block(&pair(6)).await.unwrap_err();
        assert!(matches!(err, EngineError::ApplyFailed { height: 6, .. }));
    }

    #[tokio::test]
    async fn test_handshake_needs_continuation_block() {
        let home = tempfile::tempdir().unwrap();
        let mut engine = started(home.path()).await;
        engine.apply_block(&pair(8)).await.unwrap();
        engine.do_handshake().await.unwrap();

        std::fs::remove_file(FileStoreEngine::block_path(&home.path().join("data/ksync"), 8)).unwrap();
        let mut reopened = started(home.path()).await;
        assert!(matches!(
            reopened.do_handshake().await,
            Err(EngineError::HandshakeFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_state_file() {
        let home = tempfile::tempdir().unwrap();
        let store = home.path().join("data/ksync");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join(STATE_FILE), b"not json").unwrap();

        let mut engine = FileStoreEngine::new();
        let err = engine.start_engine(home.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::CorruptState { .. }));
    }

    #[tokio::test]
    async fn test_honours_db_dir_from_node_config() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("config")).unwrap();
        std::fs::write(home.path().join("config/config.toml"), "db_dir = \"chain-db\"\n").unwrap();

        let mut engine = started(home.path()).await;
        engine.apply_block(&pair(2)).await.unwrap();

        assert!(FileStoreEngine::block_path(&home.path().join("chain-db/ksync"), 2).exists());
    }
}
