//! Testing utilities for breakfast pipelines.
//!
//! This module provides:
//! - Scripted pancakes and batch sources with deterministic failures
//! - Recording tracers and consumers
//! - Assertions over recorded events and spans

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_child_span, assert_event_closed_once, assert_event_error, assert_span_failed,
    wait_for_closed_event,
};
pub use fixtures::{ScriptedPancake, ScriptedSource, SyrupLog};
pub use mocks::{test_telemetry, CollectingDiner, CollectingTracer};
