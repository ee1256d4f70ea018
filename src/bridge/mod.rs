//! Native command bridge.
//!
//! The chat core depends only on [`CommandExecutor`]; the process-backed
//! implementation shells out to the generation script.

pub mod executor;
pub mod process;

pub use executor::{CommandError, CommandExecutor, CommandFuture, CommandResult};
pub use process::ProcessCommandExecutor;
