pub mod block;
pub mod bundle;
pub mod key;
pub mod pool;
pub mod serde_utils;

pub use block::{Block, BlockError, BlockPair};
pub use bundle::{Bundle, BundlePage, CursorError, DataItem, FinalizedBundle, FinalizedBundlesResponse, PageCursor, Pagination};
pub use key::{parse_block_key, KeyError, SnapshotKey};
pub use pool::{Pool, PoolData, PoolResponse};
