//! Request coordination and the run loop.

mod coordinator;
mod runner;

pub use coordinator::{Consumer, Diner, Kitchen, ServeState, ROOT_SPAN};
pub use runner::{run_forever, run_with_output, RunSummary};
