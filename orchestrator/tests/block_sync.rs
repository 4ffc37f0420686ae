use std::path::Path;
use std::sync::{Arc, Mutex};

use archive::testing::{MockArchive, MockRegistry, MockStorage, BLOCK_RUNTIME, SNAPSHOT_RUNTIME};
use archive::{ArchiveError, CollectorOutcome};
use async_trait::async_trait;
use metrics::Metrics;
use orchestrator::{BlockSync, StartHeight, SyncError, SyncOptions};
use pretty_assertions::assert_eq;
use replay::{ApplyOutcome, Engine, EngineError, FileStoreEngine, ReplayError};
use types::BlockPair;

const BLOCK_POOL: u64 = 1;
const SNAPSHOT_POOL: u64 = 2;

fn archive_with_blocks(bundles: u64) -> MockArchive {
    let archive = MockArchive::new();
    archive.registry.add_pool(BLOCK_POOL, BLOCK_RUNTIME, "1", &(bundles * 10).to_string());
    for id in 0..bundles {
        archive.add_block_bundle(BLOCK_POOL, id, id * 10 + 1, id * 10 + 10);
    }
    archive
}

fn block_sync(archive: &MockArchive) -> BlockSync<MockRegistry, MockStorage> {
    BlockSync::new(archive.registry.clone(), archive.storage.clone())
}

fn options(home: &Path, start: StartHeight, target: Option<u64>) -> SyncOptions {
    SyncOptions {
        start,
        target_height: target,
        page_limit: 2,
        channel_capacity: 8,
        ..SyncOptions::new(home, BLOCK_POOL)
    }
}

fn file_store() -> Vec<Box<dyn Engine>> {
    vec![Box::new(FileStoreEngine::new())]
}

/// Engine that records calls and can be told to fail.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    continuation: u64,
    fail_apply_at: Option<u64>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Engine for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn compatible_runtimes(&self) -> &[&str] {
        &[BLOCK_RUNTIME]
    }

    fn parse_height_from_key(&self, key: &str) -> Result<u64, EngineError> {
        Ok(types::parse_block_key(key)?)
    }

    async fn start_engine(&mut self, _home: &Path) -> Result<(), EngineError> {
        self.record("start");
        Ok(())
    }

    async fn stop_engine(&mut self) -> Result<(), EngineError> {
        self.record("stop");
        Ok(())
    }

    async fn continuation_height(&self) -> Result<u64, EngineError> {
        Ok(self.continuation)
    }

    async fn do_handshake(&mut self) -> Result<(), EngineError> {
        self.record("handshake");
        Ok(())
    }

    async fn apply_block(&mut self, pair: &BlockPair) -> Result<ApplyOutcome, EngineError> {
        let height = pair.height();
        if self.fail_apply_at == Some(height) {
            return Err(EngineError::ApplyFailed {
                height,
                reason: "app hash mismatch".to_string(),
            });
        }
        self.record(format!("apply {height}"));
        Ok(ApplyOutcome::Applied)
    }
}

#[tokio::test]
async fn test_sync_to_target_and_resume() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(3);
    let sync = block_sync(&archive);

    let report = sync
        .run(&options(home.path(), StartHeight::Continuation, Some(25)), file_store())
        .await
        .unwrap();

    assert_eq!(report.engine, "file-store");
    assert_eq!(report.start_height, 0);
    assert_eq!(report.last_applied_height, Some(25));
    assert_eq!(report.blocks_applied, 24);
    assert_eq!(report.collector.outcome, CollectorOutcome::TargetReached);

    // The second session resumes from the store and skips the first bundle.
    let report = sync
        .run(&options(home.path(), StartHeight::Continuation, None), file_store())
        .await
        .unwrap();

    assert_eq!(report.continuation_height, 25);
    assert_eq!(report.start_height, 25);
    assert_eq!(report.last_applied_height, Some(30));
    assert_eq!(report.blocks_applied, 5);
    assert_eq!(report.collector.bundles_skipped, 2);
    assert_eq!(report.collector.outcome, CollectorOutcome::Exhausted);
}

#[tokio::test]
async fn test_explicit_start_below_continuation_uses_continuation() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(3);
    let sync = block_sync(&archive);
    sync.run(&options(home.path(), StartHeight::Explicit(0), Some(12)), file_store())
        .await
        .unwrap();

    let report = sync
        .run(&options(home.path(), StartHeight::Explicit(5), Some(20)), file_store())
        .await
        .unwrap();

    assert_eq!(report.start_height, 12);
    assert_eq!(report.blocks_applied, 8);
}

#[tokio::test]
async fn test_explicit_start_above_continuation() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(3);

    let report = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Explicit(15), Some(18)), file_store())
        .await
        .unwrap();

    assert_eq!(report.start_height, 15);
    assert_eq!(report.blocks_applied, 3);
    assert_eq!(report.last_applied_height, Some(18));
}

#[tokio::test]
async fn test_start_from_nearest_snapshot() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(5);
    archive.registry.add_pool(SNAPSHOT_POOL, SNAPSHOT_RUNTIME, "10/0", "40/0");
    for (id, height) in [10, 20, 30, 40].into_iter().enumerate() {
        archive.add_snapshot_bundle(SNAPSHOT_POOL, id as u64, height, 0);
    }
    let start = StartHeight::NearestSnapshot {
        snapshot_pool_id: SNAPSHOT_POOL,
    };

    let report = block_sync(&archive)
        .run(&options(home.path(), start, Some(35)), file_store())
        .await
        .unwrap();

    assert_eq!(report.start_height, 30);
    assert_eq!(report.last_applied_height, Some(35));
    assert_eq!(report.blocks_applied, 5);
}

#[tokio::test]
async fn test_snapshot_start_needs_target() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(1);
    let start = StartHeight::NearestSnapshot {
        snapshot_pool_id: SNAPSHOT_POOL,
    };

    let err = block_sync(&archive)
        .run(&options(home.path(), start, None), file_store())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TargetRequired));
}

#[tokio::test]
async fn test_runtime_mismatch_fetches_nothing() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(2);
    archive.registry.add_pool(BLOCK_POOL, "@kyvejs/evm", "1", "20");
    let engine = Recorder::default();

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), vec![Box::new(engine.clone())])
        .await
        .unwrap_err();

    match err {
        SyncError::RuntimeMismatch { runtime, supported, .. } => {
            assert_eq!(runtime, "@kyvejs/evm");
            assert_eq!(supported, vec![BLOCK_RUNTIME.to_string()]);
        }
        other => panic!("expected runtime mismatch, got {other:?}"),
    }
    assert!(engine.calls().is_empty());
    assert!(archive.storage.fetched().is_empty());
}

#[tokio::test]
async fn test_no_engines() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(1);

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), Vec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NoCompatibleEngine));
}

#[tokio::test]
async fn test_unknown_pool_is_not_found() {
    let home = tempfile::tempdir().unwrap();
    let archive = MockArchive::new();

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), file_store())
        .await
        .unwrap_err();

    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_target_not_ahead_still_stops_engine() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(2);
    let engine = Recorder {
        continuation: 15,
        ..Default::default()
    };

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, Some(15)), vec![Box::new(engine.clone())])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TargetNotAhead { start: 15, target: 15 }));
    assert_eq!(engine.calls(), vec!["start", "stop"]);
    assert!(archive.storage.fetched().is_empty());
}

#[tokio::test]
async fn test_apply_failure_ends_session() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(3);
    let engine = Recorder {
        fail_apply_at: Some(4),
        ..Default::default()
    };

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), vec![Box::new(engine.clone())])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Replay(ReplayError::ApplyFailed { height: 4, .. })
    ));
    assert_eq!(engine.calls(), vec!["start", "handshake", "apply 2", "apply 3", "stop"]);
}

#[tokio::test]
async fn test_apply_failure_stops_bundle_fetches() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(20);
    let engine = Recorder {
        fail_apply_at: Some(4),
        ..Default::default()
    };
    let options = SyncOptions {
        channel_capacity: 1,
        ..options(home.path(), StartHeight::Continuation, None)
    };

    let err = block_sync(&archive)
        .run(&options, vec![Box::new(engine.clone())])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Replay(ReplayError::ApplyFailed { .. })));

    let fetched = archive.storage.fetched();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(archive.storage.fetched(), fetched);
    assert!(fetched.len() <= 2, "fetched {fetched:?}");
}

#[tokio::test]
async fn test_unreadable_pool_key_fails_before_start() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(2);
    archive.registry.add_pool(BLOCK_POOL, BLOCK_RUNTIME, "1", "latest");
    let engine = Recorder::default();

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), vec![Box::new(engine.clone())])
        .await
        .unwrap_err();

    match err {
        SyncError::InvalidPoolKey { pool_id, key, .. } => {
            assert_eq!(pool_id, BLOCK_POOL);
            assert_eq!(key, "latest");
        }
        other => panic!("expected invalid pool key, got {other:?}"),
    }
    assert!(engine.calls().is_empty());
    assert!(archive.storage.fetched().is_empty());
}

#[tokio::test]
async fn test_report_carries_archive_head() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(2);

    let report = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, Some(50)), file_store())
        .await
        .unwrap();

    assert_eq!(report.archive_head_height, Some(20));
    assert_eq!(report.last_applied_height, Some(20));
    assert_eq!(report.collector.outcome, CollectorOutcome::Exhausted);
}

#[tokio::test]
async fn test_checksum_failure_ends_session() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(1);
    let bytes = archive::testing::encode_items(&archive::testing::block_items(11, 20));
    archive.add_raw_bundle(BLOCK_POOL, 1, "11", "20", 1, bytes, b"other bytes");
    let engine = Recorder::default();

    let err = block_sync(&archive)
        .run(&options(home.path(), StartHeight::Continuation, None), vec![Box::new(engine.clone())])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Archive(ArchiveError::ChecksumMismatch { .. })
    ));
    let calls = engine.calls();
    assert_eq!(calls.last().map(String::as_str), Some("stop"));
    assert!(calls.contains(&"apply 10".to_string()));
    assert!(!calls.iter().any(|call| call == "apply 11"));
}

#[tokio::test]
async fn test_metrics_follow_progress() {
    let home = tempfile::tempdir().unwrap();
    let archive = archive_with_blocks(2);
    let metrics = Arc::new(Metrics::new());

    block_sync(&archive)
        .with_metrics(metrics.clone())
        .run(&options(home.path(), StartHeight::Explicit(10), Some(20)), file_store())
        .await
        .unwrap();

    let output = metrics.gather();
    assert!(output.contains("ksync_current_height 20"));
    assert!(output.contains("ksync_target_height 20"));
    assert!(output.contains("ksync_blocks_applied_total 10"));
    assert!(output.contains("ksync_bundles_skipped_total 0"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_node_binary_runs_for_the_session() {
    use std::os::unix::fs::PermissionsExt;
    use supervisor::{ProcessSupervisor, StartMode};

    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events");
    let binary = dir.path().join("node");
    let script = format!(
        "#!/bin/sh\ntrap 'echo term >> {events}; exit 0' TERM\necho started >> {events}\nwhile true; do sleep 0.05; done\n",
        events = events.display()
    );
    std::fs::write(&binary, script).unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

    let home = dir.path().join("home");
    let archive = archive_with_blocks(1);
    let sync = block_sync(&archive)
        .with_supervisor(ProcessSupervisor::new(&binary, &home), StartMode::DatabaseOnly);

    // Give the script time to install its trap before the short session ends.
    let engine = SlowStart(FileStoreEngine::new());
    let report = sync
        .run(&options(&home, StartHeight::Continuation, None), vec![Box::new(engine)])
        .await
        .unwrap();

    assert_eq!(report.last_applied_height, Some(10));
    let events = std::fs::read_to_string(&events).unwrap();
    assert_eq!(events.lines().collect::<Vec<_>>(), vec!["started", "term"]);
}

/// File store that waits a little before opening, like a real engine
/// connecting to a freshly started node.
struct SlowStart(FileStoreEngine);

#[async_trait]
impl Engine for SlowStart {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn compatible_runtimes(&self) -> &[&str] {
        self.0.compatible_runtimes()
    }

    fn parse_height_from_key(&self, key: &str) -> Result<u64, EngineError> {
        self.0.parse_height_from_key(key)
    }

    async fn start_engine(&mut self, home: &Path) -> Result<(), EngineError> {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        self.0.start_engine(home).await
    }

    async fn stop_engine(&mut self) -> Result<(), EngineError> {
        self.0.stop_engine().await
    }

    async fn continuation_height(&self) -> Result<u64, EngineError> {
        self.0.continuation_height().await
    }

    async fn do_handshake(&mut self) -> Result<(), EngineError> {
        self.0.do_handshake().await
    }

    async fn apply_block(&mut self, pair: &BlockPair) -> Result<ApplyOutcome, EngineError> {
        self.0.apply_block(pair).await
    }
}
