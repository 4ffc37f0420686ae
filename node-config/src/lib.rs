pub mod home;
pub mod network;

pub use home::{AppConfig, ConfigError, HomeConfig, NodeConfig};
pub use network::{storage_gateway, Network};

/// Bundles requested per registry page.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// Block pairs buffered between the collector and the replay loop.
pub const DEFAULT_BLOCK_CHANNEL_CAPACITY: usize = 100;

/// How long a stopped node binary may take to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 30;

pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

pub const DEFAULT_METRICS_PORT: u16 = 8080;

pub const COMPRESSION_NONE: u32 = 0;
pub const COMPRESSION_GZIP: u32 = 1;
