//! Work items and their generators.
//!
//! The pipeline is generic over [`Cookable`] items produced by a
//! [`BatchSource`]. [`Pancake`] and [`Griddle`] are the stock implementations.

mod pancake;

pub use pancake::{Griddle, GriddleConfig, Pancake};

use crate::errors::CookError;

/// A unit of work with two destructive operations and one inspection.
///
/// Items are moved, never copied, between stages, so implementations only
/// need to be `Send`.
pub trait Cookable: Send + 'static {
    /// First-stage transform. Mutates the item in place.
    fn flip(&mut self) -> Result<(), CookError>;

    /// Batch-level inspection performed after cooking.
    fn is_burnt(&self) -> bool;

    /// Second-stage transform. Mutates the item in place; failures are
    /// recoverable.
    fn syrup(&mut self) -> Result<(), CookError>;
}

/// Produces batches of items.
pub trait BatchSource: Send + Sync {
    /// The item type produced.
    type Item: Cookable;

    /// Makes exactly `n` items.
    fn make_batch(&self, n: usize) -> Vec<Self::Item>;
}
