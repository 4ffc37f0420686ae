/// Block sync session.
///
/// One session, in order:
///
/// 1. Look up the block pool and pick the engine matching its runtime.
/// 2. Resolve the requested start height (explicit, continuation, or the
///    nearest snapshot below the target).
/// 3. Start the node binary in a restricted mode, if one is configured.
/// 4. Start the engine; the effective start is the larger of the requested
///    start and the engine's continuation height.
/// 5. Handshake, then apply every pair the collector emits.
/// 6. Stop the engine and the node binary, whatever the outcome.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use archive::{BlockCollector, CollectorConfig, CollectorSummary, PairResult, Registry, Storage};
use metrics::SharedMetrics;
use node_config::{DEFAULT_BLOCK_CHANNEL_CAPACITY, DEFAULT_PAGE_LIMIT};
use replay::{select_engine, ApplyOutcome, Engine, ReplayDriver};
use supervisor::{ProcessSupervisor, StartMode};
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Span};

use crate::error::SyncError;
use crate::lookup::{find_snapshot, SnapshotQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartHeight {
    /// Start after this height, or later if the engine is already past it.
    Explicit(u64),
    /// Start at the latest snapshot at or below the target height.
    NearestSnapshot { snapshot_pool_id: u64 },
    /// Resume from the engine's continuation height.
    Continuation,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub home: PathBuf,
    pub block_pool_id: u64,
    pub start: StartHeight,
    /// `None` syncs until the archive is exhausted.
    pub target_height: Option<u64>,
    pub page_limit: u32,
    pub channel_capacity: usize,
}

impl SyncOptions {
    pub fn new(home: impl Into<PathBuf>, block_pool_id: u64) -> Self {
        Self {
            home: home.into(),
            block_pool_id,
            start: StartHeight::Continuation,
            target_height: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            channel_capacity: DEFAULT_BLOCK_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub engine: String,
    pub continuation_height: u64,
    /// Height the collector started after.
    pub start_height: u64,
    pub last_applied_height: Option<u64>,
    pub blocks_applied: u64,
    /// Height of the pool's latest archived key, `None` for an empty pool.
    pub archive_head_height: Option<u64>,
    pub collector: CollectorSummary,
}

pub struct BlockSync<R, S> {
    registry: Arc<R>,
    storage: S,
    supervisor: Option<(ProcessSupervisor, StartMode)>,
    metrics: Option<SharedMetrics>,
    span: Span,
}

impl<R, S> BlockSync<R, S>
where
    R: Registry + 'static,
    S: Storage + Clone + 'static,
{
    pub fn new(registry: Arc<R>, storage: S) -> Self {
        Self {
            registry,
            storage,
            supervisor: None,
            metrics: None,
            span: info_span!("block_sync"),
        }
    }

    /// Run the node binary in `mode` for the duration of each session.
    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor, mode: StartMode) -> Self {
        self.supervisor = Some((supervisor, mode));
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn run(&self, options: &SyncOptions, engines: Vec<Box<dyn Engine>>) -> Result<SyncReport, SyncError> {
        let pool = self.registry.pool(options.block_pool_id).await?;
        let runtime = pool.runtime().to_string();

        if engines.is_empty() {
            return Err(SyncError::NoCompatibleEngine);
        }
        let supported: Vec<String> = engines
            .iter()
            .flat_map(|engine| engine.compatible_runtimes().iter().map(|name| name.to_string()))
            .collect();
        let engine = select_engine(&runtime, engines).ok_or_else(|| SyncError::RuntimeMismatch {
            pool_id: pool.id,
            runtime: runtime.clone(),
            supported,
        })?;

        let archive_head = match pool.data.current_key.as_str() {
            "" => None,
            key => Some(engine.parse_height_from_key(key).map_err(|source| SyncError::InvalidPoolKey {
                pool_id: pool.id,
                key: key.to_string(),
                source,
            })?),
        };

        info!(
            parent: &self.span,
            pool_id = pool.id,
            pool = %pool.data.name,
            runtime = %runtime,
            engine = engine.name(),
            archive_head = ?archive_head,
            "Block pool resolved"
        );

        let requested_start = self.resolve_start(options).await?;

        let mut process = match &self.supervisor {
            Some((supervisor, mode)) => Some(supervisor.start(*mode)?),
            None => None,
        };

        let replay_span = info_span!(parent: &self.span, "replay", engine = engine.name());
        let mut driver = ReplayDriver::new(engine).with_span(replay_span);
        let session = self.session(options, requested_start, archive_head, &mut driver).await;

        let engine_stopped = driver.stop().await;
        let process_stopped = match process.as_mut() {
            Some(handle) => handle.stop().await.map(|_| ()),
            None => Ok(()),
        };

        if session.is_err() {
            if let Err(err) = &engine_stopped {
                warn!(parent: &self.span, error = %err, "Engine stop failed after session error");
            }
            if let Err(err) = &process_stopped {
                warn!(parent: &self.span, error = %err, "Node binary stop failed after session error");
            }
        }

        let report = session?;
        engine_stopped?;
        process_stopped?;

        info!(
            parent: &self.span,
            start_height = report.start_height,
            last_applied = ?report.last_applied_height,
            blocks_applied = report.blocks_applied,
            "Block sync finished"
        );
        Ok(report)
    }

    async fn resolve_start(&self, options: &SyncOptions) -> Result<u64, SyncError> {
        match options.start {
            StartHeight::Explicit(height) => Ok(height),
            StartHeight::Continuation => Ok(0),
            StartHeight::NearestSnapshot { snapshot_pool_id } => {
                let target = options.target_height.ok_or(SyncError::TargetRequired)?;
                let location = find_snapshot(
                    self.registry.as_ref(),
                    snapshot_pool_id,
                    SnapshotQuery::Nearest(target),
                    options.page_limit,
                )
                .await?;
                Ok(location.snapshot_height)
            }
        }
    }

    async fn session(
        &self,
        options: &SyncOptions,
        requested_start: u64,
        archive_head: Option<u64>,
        driver: &mut ReplayDriver,
    ) -> Result<SyncReport, SyncError> {
        let continuation = driver.start(&options.home).await?;
        let start_height = requested_start.max(continuation);

        if let Some(target) = options.target_height {
            if target <= start_height {
                return Err(SyncError::TargetNotAhead {
                    start: start_height,
                    target,
                });
            }
        }

        if let (Some(target), Some(head)) = (options.target_height, archive_head) {
            if target > head {
                warn!(
                    parent: &self.span,
                    target_height = target,
                    archive_head = head,
                    "Target height is beyond the archived range"
                );
            }
        }

        driver.handshake().await?;

        if let Some(metrics) = &self.metrics {
            metrics.set_current_height(start_height);
            metrics.set_target_height(options.target_height);
        }
        info!(
            parent: &self.span,
            requested_start,
            continuation_height = continuation,
            start_height,
            target_height = ?options.target_height,
            "Starting block sync"
        );

        let config = CollectorConfig {
            page_limit: options.page_limit,
            channel_capacity: options.channel_capacity,
            ..CollectorConfig::new(options.block_pool_id, start_height, options.target_height)
        };
        let mut collector = BlockCollector::new(self.registry.clone(), self.storage.clone(), config)
            .with_span(info_span!(parent: &self.span, "collector", pool_id = options.block_pool_id));
        if let Some(metrics) = &self.metrics {
            collector = collector.with_metrics(metrics.clone());
        }
        let (mut pairs, collector_handle) = collector.spawn();

        if let Err(err) = self.apply_pairs(&mut pairs, driver).await {
            // Stop fetching as soon as the session fails.
            collector_handle.abort();
            return Err(err);
        }

        let summary = collector_handle
            .await
            .map_err(|err| SyncError::CollectorAborted(err.to_string()))?;

        if let Some(target) = options.target_height {
            if driver.last_applied().unwrap_or(start_height) < target {
                warn!(
                    parent: &self.span,
                    target_height = target,
                    last_applied = ?driver.last_applied(),
                    "Archive exhausted before the target height"
                );
            }
        }

        Ok(SyncReport {
            engine: driver.engine_name().to_string(),
            continuation_height: continuation,
            start_height,
            last_applied_height: driver.last_applied(),
            blocks_applied: driver.blocks_applied(),
            archive_head_height: archive_head,
            collector: summary,
        })
    }

    async fn apply_pairs(
        &self,
        pairs: &mut mpsc::Receiver<PairResult>,
        driver: &mut ReplayDriver,
    ) -> Result<(), SyncError> {
        while let Some(pair) = pairs.recv().await {
            let pair = pair?;
            let height = pair.height();

            let started = Instant::now();
            let outcome = driver.apply(&pair).await?;

            if let (ApplyOutcome::Applied, Some(metrics)) = (outcome, &self.metrics) {
                metrics.inc_blocks_applied();
                metrics.observe_block_apply_time(started.elapsed().as_secs_f64());
                metrics.set_current_height(height);
            }
        }
        Ok(())
    }
}
