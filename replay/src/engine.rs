use std::path::Path;

use async_trait::async_trait;
use types::BlockPair;

use crate::error::EngineError;

/// Result of handing one block pair to an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The height was at or below the continuation height. Nothing changed.
    AlreadyApplied,
}

/// A node application backend the replay driver can feed blocks into.
///
/// Implementations are selected per session by matching a pool's runtime
/// against [`Engine::compatible_runtimes`].
#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    /// Pool runtimes whose block format this engine understands.
    fn compatible_runtimes(&self) -> &[&str];

    /// Height encoded in one of the pool's keys. Used to read the pool's
    /// archive head before a session starts.
    fn parse_height_from_key(&self, key: &str) -> Result<u64, EngineError>;

    /// Open the node's stores under `home`.
    async fn start_engine(&mut self, home: &Path) -> Result<(), EngineError>;

    async fn stop_engine(&mut self) -> Result<(), EngineError>;

    /// Last height the application durably applied, 0 for an empty store.
    async fn continuation_height(&self) -> Result<u64, EngineError>;

    async fn do_handshake(&mut self) -> Result<(), EngineError>;

    /// Apply `pair.second`. Heights at or below the continuation height must
    /// return [`ApplyOutcome::AlreadyApplied`] without side effects.
    async fn apply_block(&mut self, pair: &BlockPair) -> Result<ApplyOutcome, EngineError>;
}

/// Take the first engine compatible with `runtime` out of `engines`.
pub fn select_engine(runtime: &str, engines: Vec<Box<dyn Engine>>) -> Option<Box<dyn Engine>> {
    engines
        .into_iter()
        .find(|engine| engine.compatible_runtimes().contains(&runtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_store::FileStoreEngine;

    struct Named(&'static str, &'static [&'static str]);

    #[async_trait]
    impl Engine for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn compatible_runtimes(&self) -> &[&str] {
            self.1
        }
        fn parse_height_from_key(&self, key: &str) -> Result<u64, EngineError> {
            Ok(types::parse_block_key(key)?)
        }
        async fn start_engine(&mut self, _home: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        async fn stop_engine(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn continuation_height(&self) -> Result<u64, EngineError> {
            Ok(0)
        }
        async fn do_handshake(&mut self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn apply_block(&mut self, _pair: &BlockPair) -> Result<ApplyOutcome, EngineError> {
            Ok(ApplyOutcome::Applied)
        }
    }

    fn engines() -> Vec<Box<dyn Engine>> {
        vec![
            Box::new(Named("cosmos", &["@kyvejs/cosmos"])),
            Box::new(FileStoreEngine::new()),
            Box::new(Named("late", &["@kyvejs/tendermint-bsync"])),
        ]
    }

    #[test]
    fn test_select_first_compatible() {
        let engine = select_engine("@kyvejs/tendermint-bsync", engines()).unwrap();
        assert_eq!(engine.name(), "file-store");

        let engine = select_engine("@kyvejs/cosmos", engines()).unwrap();
        assert_eq!(engine.name(), "cosmos");
    }

    #[test]
    fn test_select_none_for_unknown_runtime() {
        assert!(select_engine("@kyvejs/evm", engines()).is_none());
        assert!(select_engine("@kyvejs/tendermint", Vec::new()).is_none());
    }
}
