//! Event system for observability.
//!
//! An [`EventScope`] marks a unit of work in progress. Closing it reports an
//! `event.done` record to the configured [`EventSink`].

mod scope;
mod sink;

pub use scope::{EventGuard, EventScope};
pub use sink::{CollectingEventSink, EventRecord, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type emitted when an event scope closes.
pub const EVENT_DONE: &str = "event.done";

/// Event type emitted when an error is tagged on an already closed scope.
pub const EVENT_LATE_ERROR: &str = "event.late_error";
