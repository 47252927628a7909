//! Structured cancellation utilities.
//!
//! This module provides:
//! - CancellationToken for cooperative, hierarchical cancellation
//! - CancelGuard for cancelling a token on every exit path of a scope

mod token;

pub use token::{CancelGuard, CancellationToken};
