//! # Breakfast
//!
//! An instrumented, cancellable staged request pipeline.
//!
//! One request ("serve breakfast") runs in two stages:
//!
//! - **Flip**: flip every pancake, let the batch cook, reject burnt batches
//! - **Syrup**: syrup pancakes on a spawned producer and stream the ready
//!   ones to a consumer, setting soggy ones aside
//!
//! Every request carries a [`TraceContext`](context::TraceContext) holding
//! its cancellation token, its root span and the current event. Spans and
//! events are closed exactly once on every exit path, including cancellation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use breakfast::prelude::*;
//!
//! let (tracer, closer) = init_tracer("Breakfast", &TracerConfig::default())?;
//! let kitchen = Kitchen::new(Telemetry::logging(tracer), Griddle::default(), Diner);
//!
//! kitchen.serve_breakfast().await?;
//! closer.close();
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod items;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancelGuard, CancellationToken};
    pub use crate::config::BreakfastConfig;
    pub use crate::context::{Telemetry, TraceContext};
    pub use crate::errors::{BreakfastError, CookError};
    pub use crate::events::{EventScope, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::items::{BatchSource, Cookable, Griddle, GriddleConfig, Pancake};
    pub use crate::observability::{
        init_tracer, LoggingTracer, SamplerType, Tracer, TracerCloser, TracerConfig,
    };
    pub use crate::pipeline::{run_forever, Consumer, Diner, Kitchen, RunSummary};
    pub use crate::stages::{flip_pancakes, syrup_pancakes, PancakeStream, ServePolicy};
}
