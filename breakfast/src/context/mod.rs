//! Context management for pipeline execution.
//!
//! This module provides:
//! - TraceContext, the immutable carrier for cancellation, span and event
//! - Telemetry, the tracer and event sink handed to a kitchen at construction

mod telemetry;
mod trace;

pub use telemetry::Telemetry;
pub use trace::TraceContext;
