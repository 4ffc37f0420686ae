//! Lifecycle of the node binary around a sync session.
//!
//! The node is started in a restricted mode so that nothing else writes
//! blocks into its stores while the session runs, and stopped with a
//! termination signal once the session ends.
mod error;
mod mode;
mod process;

pub use error::ProcessError;
pub use mode::StartMode;
pub use process::{stop_pid, ProcessHandle, ProcessSupervisor};
