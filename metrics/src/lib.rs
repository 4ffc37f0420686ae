pub mod server;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    // Replay
    current_height: IntGauge,
    target_height: IntGauge,
    blocks_applied: IntCounter,
    block_apply_time: HistogramVec,
    // Archive
    bundles_fetched: IntCounterVec,
    bundles_skipped: IntCounter,
    bundle_fetch_time: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let current_height = IntGauge::with_opts(Opts::new("ksync_current_height", "Height of the last block applied by the engine")).unwrap();
        registry.register(Box::new(current_height.clone())).unwrap();

        let target_height = IntGauge::with_opts(Opts::new("ksync_target_height", "Requested target height, 0 when unbounded")).unwrap();
        registry.register(Box::new(target_height.clone())).unwrap();

        let blocks_applied = IntCounter::with_opts(Opts::new("ksync_blocks_applied_total", "Total number of blocks applied from the archive")).unwrap();
        registry.register(Box::new(blocks_applied.clone())).unwrap();

        let block_apply_time = HistogramVec::new(
            HistogramOpts::new("ksync_block_apply_time_seconds", "Time taken by the engine to apply one block")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0, 5.0]),
            &[],
        ).unwrap();
        registry.register(Box::new(block_apply_time.clone())).unwrap();

        let bundles_fetched = IntCounterVec::new(
            Opts::new("ksync_bundles_fetched_total", "Total number of bundles retrieved from storage"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(bundles_fetched.clone())).unwrap();

        let bundles_skipped = IntCounter::with_opts(Opts::new("ksync_bundles_skipped_total", "Bundles skipped because they end below the start height")).unwrap();
        registry.register(Box::new(bundles_skipped.clone())).unwrap();

        let bundle_fetch_time = HistogramVec::new(
            HistogramOpts::new("ksync_bundle_fetch_time_seconds", "Time taken to retrieve and decode one bundle")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &[],
        ).unwrap();
        registry.register(Box::new(bundle_fetch_time.clone())).unwrap();

        Self {
            registry,
            current_height,
            target_height,
            blocks_applied,
            block_apply_time,
            bundles_fetched,
            bundles_skipped,
            bundle_fetch_time,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    // Replay
    pub fn set_current_height(&self, height: u64) {
        self.current_height.set(height as i64);
    }

    pub fn set_target_height(&self, height: Option<u64>) {
        self.target_height.set(height.unwrap_or_default() as i64);
    }

    pub fn current_height(&self) -> u64 {
        self.current_height.get().max(0) as u64
    }

    /// `None` when the sync runs until the archive is exhausted.
    pub fn target_height(&self) -> Option<u64> {
        let target = self.target_height.get();
        (target > 0).then_some(target as u64)
    }

    pub fn inc_blocks_applied(&self) {
        self.blocks_applied.inc();
    }

    pub fn observe_block_apply_time(&self, duration: f64) {
        self.block_apply_time.with_label_values::<&str>(&[]).observe(duration);
    }

    // Archive
    pub fn inc_bundles_fetched(&self, result: &str) {
        self.bundles_fetched.with_label_values(&[result]).inc();
    }

    pub fn inc_bundles_skipped(&self) {
        self.bundles_skipped.inc();
    }

    pub fn observe_bundle_fetch_time(&self, duration: f64) {
        self.bundle_fetch_time.with_label_values::<&str>(&[]).observe(duration);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
