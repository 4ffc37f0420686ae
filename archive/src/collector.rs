/// Block collector: turns a block pool's bundles into block pairs.
///
/// The collector walks the pool's bundle index oldest first, skips bundles
/// that end below the start height without fetching them, and retrieves and
/// decodes the rest. Decoded items feed a sliding window that emits
/// `(previous, current)` pairs for every height above the start height, up
/// to and including the target height.
///
/// ## Flow control
///
/// Pairs go out over a bounded channel. When the consumer falls behind the
/// send blocks, which in turn holds back further page and bundle fetches.
///
/// ## Termination
///
/// - Index exhausted: the channel closes after the last pair.
/// - Target reached: the channel closes right after the target pair; later
///   bundles and pages are never fetched.
/// - Fatal error: the error is sent as the final channel item and the
///   collector stops. No partial recovery is attempted.
/// - Consumer gone: the collector stops at its next send.
use std::time::Instant;

use metrics::SharedMetrics;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, info_span, Instrument, Span};
use types::{parse_block_key, Block, BlockPair, Bundle, DataItem, FinalizedBundle};

use crate::client::{Registry, Storage};
use crate::codec::BundleCodec;
use crate::error::ArchiveError;
use crate::index::BundleIndex;

pub type PairResult = Result<BlockPair, ArchiveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorConfig {
    pub pool_id: u64,
    /// Last height the engine already holds. The first emitted pair applies
    /// `start_height + 1`.
    pub start_height: u64,
    /// Last height to emit. `None` runs until the index is exhausted.
    pub target_height: Option<u64>,
    pub page_limit: u32,
    pub channel_capacity: usize,
}

impl CollectorConfig {
    pub fn new(pool_id: u64, start_height: u64, target_height: Option<u64>) -> Self {
        Self {
            pool_id,
            start_height,
            target_height,
            page_limit: node_config::DEFAULT_PAGE_LIMIT,
            channel_capacity: node_config::DEFAULT_BLOCK_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectorOutcome {
    #[default]
    Exhausted,
    TargetReached,
    ConsumerClosed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    pub outcome: CollectorOutcome,
    pub pages_fetched: usize,
    pub bundles_skipped: usize,
    pub bundles_fetched: usize,
    pub pairs_emitted: usize,
    pub last_height: Option<u64>,
}

pub struct BlockCollector<R, S> {
    registry: R,
    storage: S,
    config: CollectorConfig,
    metrics: Option<SharedMetrics>,
    span: Span,
}

impl<R, S> BlockCollector<R, S>
where
    R: Registry + 'static,
    S: Storage + 'static,
{
    pub fn new(registry: R, storage: S, config: CollectorConfig) -> Self {
        let span = info_span!("collector", pool_id = config.pool_id);
        Self {
            registry,
            storage,
            config,
            metrics: None,
            span,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Run the collector as its own task.
    ///
    /// The receiver yields pairs in height order and ends when the collector
    /// finishes. A fatal error arrives as the last item.
    pub fn spawn(self) -> (mpsc::Receiver<PairResult>, JoinHandle<CollectorSummary>) {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let span = self.span.clone();
        let handle = tokio::spawn(self.run(tx).instrument(span));
        (rx, handle)
    }

    pub async fn run(self, tx: mpsc::Sender<PairResult>) -> CollectorSummary {
        let mut summary = CollectorSummary::default();

        match self.collect(&tx, &mut summary).await {
            Ok(outcome) => summary.outcome = outcome,
            Err(err) => {
                error!(error = %err, "Block collection aborted");
                summary.outcome = CollectorOutcome::Failed;
                // The consumer may already be gone; nothing else to tell it.
                let _ = tx.send(Err(err)).await;
            }
        }

        info!(
            outcome = ?summary.outcome,
            pages = summary.pages_fetched,
            skipped = summary.bundles_skipped,
            fetched = summary.bundles_fetched,
            pairs = summary.pairs_emitted,
            last_height = ?summary.last_height,
            "Block collector finished"
        );

        summary
    }

    async fn collect(
        &self,
        tx: &mpsc::Sender<PairResult>,
        summary: &mut CollectorSummary,
    ) -> Result<CollectorOutcome, ArchiveError> {
        let config = &self.config;
        let mut window = PairWindow::new(config.start_height, config.target_height);
        let mut index = BundleIndex::new(&self.registry, config.pool_id, config.page_limit);

        info!(
            start_height = config.start_height,
            target_height = ?config.target_height,
            "Collecting blocks"
        );

        while let Some(page) = index.next_page().await? {
            summary.pages_fetched += 1;

            for bundle in page.bundles {
                let to_height = parse_block_key(&bundle.to_key)?;
                if to_height < config.start_height {
                    debug!(bundle_id = bundle.id, to_height, "Skipping bundle below start height");
                    summary.bundles_skipped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_bundles_skipped();
                    }
                    continue;
                }

                let decoded = self.retrieve(&bundle).await?;
                summary.bundles_fetched += 1;

                for item in decoded {
                    match window.push(item)? {
                        Step::Hold => {}
                        Step::PastTarget => return Ok(CollectorOutcome::TargetReached),
                        Step::Emit(pair) => {
                            let height = pair.height();
                            if tx.send(Ok(pair)).await.is_err() {
                                debug!(height, "Pair receiver dropped");
                                return Ok(CollectorOutcome::ConsumerClosed);
                            }
                            summary.pairs_emitted += 1;
                            summary.last_height = Some(height);

                            if window.is_target(height) {
                                return Ok(CollectorOutcome::TargetReached);
                            }
                        }
                    }
                }
            }
        }

        Ok(CollectorOutcome::Exhausted)
    }

    async fn retrieve(&self, bundle: &FinalizedBundle) -> Result<Bundle, ArchiveError> {
        let started = Instant::now();

        let result = async {
            let raw = self
                .storage
                .fetch(bundle.storage_provider_id, &bundle.storage_id)
                .await?;

            let compression_id = bundle.compression_id;
            let data_hash = bundle.data_hash.clone();
            tokio::task::spawn_blocking(move || BundleCodec::decode(&raw, compression_id, &data_hash))
                .await
                .map_err(|err| ArchiveError::DecodeFailed(err.to_string()))?
        }
        .await;

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => {
                    metrics.inc_bundles_fetched("ok");
                    metrics.observe_bundle_fetch_time(elapsed.as_secs_f64());
                }
                Err(err) => metrics.inc_bundles_fetched(err.kind()),
            }
        }

        if let Ok(decoded) = &result {
            debug!(
                bundle_id = bundle.id,
                from_key = %bundle.from_key,
                to_key = %bundle.to_key,
                items = decoded.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Retrieved bundle"
            );
        }

        result
    }
}

enum Step {
    Hold,
    Emit(BlockPair),
    PastTarget,
}

/// Sliding window over decoded items, carried across bundle boundaries.
struct PairWindow {
    start: u64,
    target: Option<u64>,
    previous: Option<Block>,
    last_height: Option<u64>,
}

impl PairWindow {
    fn new(start: u64, target: Option<u64>) -> Self {
        Self {
            start,
            target,
            previous: None,
            last_height: None,
        }
    }

    fn is_target(&self, height: u64) -> bool {
        self.target == Some(height)
    }

    fn push(&mut self, item: DataItem) -> Result<Step, ArchiveError> {
        let height = parse_block_key(&item.key)?;

        if let Some(previous) = self.last_height {
            if height <= previous {
                return Err(ArchiveError::OutOfOrder {
                    previous,
                    current: height,
                });
            }
        }
        self.last_height = Some(height);

        if matches!(self.target, Some(target) if height > target) {
            return Ok(Step::PastTarget);
        }

        let current = item.value.map(Block::from_value).transpose()?;
        if let Some(block) = &current {
            if block.height != height {
                return Err(ArchiveError::DecodeFailed(format!(
                    "item {height} holds a block at height {}",
                    block.height
                )));
            }
        }

        let previous = std::mem::replace(&mut self.previous, current);
        if height <= self.start {
            return Ok(Step::Hold);
        }

        let step = match (previous, self.previous.as_ref()) {
            (Some(first), Some(second)) if first.height + 1 == second.height => {
                Step::Emit(BlockPair::new(first, second.clone())?)
            }
            (Some(first), Some(second)) => {
                debug!(from = first.height, to = second.height, "Gap in archived heights");
                Step::Hold
            }
            // An absent entry on either side leaves nothing to pair.
            _ => Step::Hold,
        };

        Ok(step)
    }
}
