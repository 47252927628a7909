//! Telemetry handles passed explicitly down the call tree.

use super::TraceContext;
use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
use crate::observability::{NoOpTracer, Span, SpanGuard, Tracer};
use std::sync::Arc;

/// The tracer and event sink used by one kitchen.
#[derive(Clone)]
pub struct Telemetry {
    tracer: Arc<dyn Tracer>,
    events: Arc<dyn EventSink>,
}

impl Telemetry {
    /// Creates telemetry from a tracer and an event sink.
    #[must_use]
    pub fn new(tracer: Arc<dyn Tracer>, events: Arc<dyn EventSink>) -> Self {
        Self { tracer, events }
    }

    /// Telemetry that records nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoOpTracer), Arc::new(NoOpEventSink))
    }

    /// Uses the given tracer with a logging event sink.
    #[must_use]
    pub fn logging(tracer: Arc<dyn Tracer>) -> Self {
        Self::new(tracer, Arc::new(LoggingEventSink::default()))
    }

    /// Returns the tracer.
    #[must_use]
    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Starts a span, as a child of the span carried by `parent` if any.
    ///
    /// The span is finished when the returned guard drops.
    #[must_use = "the span is finished as soon as the guard is dropped"]
    pub fn start_span(&self, name: &str, parent: Option<&TraceContext>) -> SpanGuard {
        let parent_span = parent.and_then(TraceContext::span);
        SpanGuard::new(Span::start(
            self.tracer.clone(),
            name,
            parent_span.map(|span| &**span),
        ))
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}
