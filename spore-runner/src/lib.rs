//! Spore Runner
//!
//! Supervised execution of external commands: incremental output, process
//! tree termination, an optional watchdog and single-slot enforcement.

pub mod error;
mod kill;
pub mod output;
pub mod process;

pub use error::RunnerError;
pub use output::{OutputHandler, StreamKind};
pub use process::{KillHandle, ProcessOutput, ProcessRunner, RunningProcess};
