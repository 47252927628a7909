//! Error types for the breakfast pipeline.
//!
//! Stage-level failures are returned to the coordinator as [`BreakfastError`].
//! Per-item failures are reported by items as [`CookError`]; the streaming
//! stage only logs them.

use thiserror::Error;

/// The main error type for breakfast operations.
#[derive(Debug, Error)]
pub enum BreakfastError {
    /// A pancake could not be flipped. The rest of the batch was not touched.
    #[error("Failed to flip pancake {index}: {source}")]
    Flip {
        /// Position of the failing pancake in the batch.
        index: usize,
        /// The underlying item failure.
        #[source]
        source: CookError,
    },

    /// Every flip succeeded but the batch burnt while cooking.
    #[error("Burnt pancake(s) at {indices:?}")]
    Burnt {
        /// Positions of the burnt pancakes, in batch order.
        indices: Vec<usize>,
    },

    /// The tracer backend could not be initialized.
    #[error("Tracer init error: {0}")]
    TracerInit(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BreakfastError {
    /// Creates a flip error for the pancake at `index`.
    #[must_use]
    pub fn flip(index: usize, source: CookError) -> Self {
        Self::Flip { index, source }
    }

    /// Returns true for a per-item flip failure.
    #[must_use]
    pub fn is_flip_failure(&self) -> bool {
        matches!(self, Self::Flip { .. })
    }

    /// Returns true for a batch-level burn failure.
    #[must_use]
    pub fn is_burnt(&self) -> bool {
        matches!(self, Self::Burnt { .. })
    }
}

impl From<serde_json::Error> for BreakfastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors reported by an individual item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CookError {
    /// The pancake stuck to the griddle while flipping.
    #[error("pancake stuck to the griddle")]
    Stuck,

    /// The pancake soaked up too much syrup.
    #[error("soggy pancake")]
    Soggy,

    /// Any other item failure.
    #[error("{0}")]
    Other(String),
}

impl CookError {
    /// Creates a custom item failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_flip_error_display_and_source() {
        let err = BreakfastError::flip(1, CookError::Stuck);
        assert_eq!(err.to_string(), "Failed to flip pancake 1: pancake stuck to the griddle");
        assert!(err.is_flip_failure());
        assert!(!err.is_burnt());
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("pancake stuck to the griddle".to_string())
        );
    }

    #[test]
    fn test_burnt_error_display() {
        let err = BreakfastError::Burnt { indices: vec![0, 2] };
        assert_eq!(err.to_string(), "Burnt pancake(s) at [0, 2]");
        assert!(err.is_burnt());
        assert!(!err.is_flip_failure());
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: BreakfastError = parse.unwrap_err().into();
        assert!(matches!(err, BreakfastError::Serialization(_)));
    }

    #[test]
    fn test_cook_error_other() {
        assert_eq!(CookError::other("dropped on floor").to_string(), "dropped on floor");
    }
}
