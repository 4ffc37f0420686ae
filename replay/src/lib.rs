//! Block replay against a node's application engine.
//!
//! - **Engine**: the capability a backend implements (start, handshake, apply)
//! - **States**: lifecycle of one replay session
//! - **Driver**: enforces the lifecycle around an engine
//! - **FileStore**: bundled backend that persists applied blocks on disk
pub mod driver;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod states;

pub use driver::ReplayDriver;
pub use engine::{select_engine, ApplyOutcome, Engine};
pub use error::{EngineError, ReplayError};
pub use file_store::FileStoreEngine;
pub use states::EngineState;
