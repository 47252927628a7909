//! Event scopes: named markers of work in progress.

use super::{EventSink, EVENT_DONE, EVENT_LATE_ERROR};
use crate::observability::Span;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// A named event in progress.
///
/// An event is closed exactly once: the first call to [`done`](Self::done)
/// finalizes it (finishes its span and emits `event.done`) and every later
/// call is ignored. An error can only be tagged while the event is open.
/// An event still open when the last handle is dropped closes itself.
pub struct EventScope {
    id: Uuid,
    name: String,
    started: Instant,
    span: Option<Arc<Span>>,
    error: RwLock<Option<String>>,
    metadata: RwLock<serde_json::Map<String, serde_json::Value>>,
    closed: AtomicBool,
    done_calls: AtomicUsize,
    sink: Arc<dyn EventSink>,
}

impl EventScope {
    /// Opens an event. `span` is the event's own span, finished on close.
    pub(crate) fn begin(
        name: impl Into<String>,
        span: Option<Arc<Span>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let name = name.into();
        let id = Uuid::new_v4();
        debug!(event = %name, event_id = %id, "Event begin");
        Self {
            id,
            name,
            started: Instant::now(),
            span,
            error: RwLock::new(None),
            metadata: RwLock::new(serde_json::Map::new()),
            closed: AtomicBool::new(false),
            done_calls: AtomicUsize::new(0),
            sink,
        }
    }

    /// Returns the event id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the event's span, if it was opened under one.
    #[must_use]
    pub fn span(&self) -> Option<&Arc<Span>> {
        self.span.as_ref()
    }

    /// Returns whether the event has been closed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns how many times [`done`](Self::done) has been called.
    #[must_use]
    pub fn done_calls(&self) -> usize {
        self.done_calls.load(Ordering::SeqCst)
    }

    /// Returns the tagged error, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    /// Tags the event with an error.
    ///
    /// Returns false (and leaves the event untouched) if it is already closed.
    pub fn set_error(&self, error: &dyn std::fmt::Display) -> bool {
        // Hold the lock across the check so a concurrent close sees the tag.
        let mut slot = self.error.write();
        if self.is_done() {
            warn!(event = %self.name, %error, "Error tagged after event closed; ignoring");
            self.sink.try_emit(
                EVENT_LATE_ERROR,
                Some(serde_json::json!({
                    "event": self.name,
                    "event_id": self.id.to_string(),
                    "error": error.to_string(),
                })),
            );
            return false;
        }
        *slot = Some(error.to_string());
        true
    }

    /// Adds a metadata entry reported when the event closes.
    pub fn append(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Closes the event.
    ///
    /// Returns true if this call performed the close.
    pub fn done(&self) -> bool {
        self.done_calls.fetch_add(1, Ordering::SeqCst);
        let slot = self.error.write();
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let error = slot.clone();
        drop(slot);

        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        if let Some(span) = &self.span {
            if let Some(ref message) = error {
                span.set_error(message);
            }
            span.finish();
        }

        let mut payload = serde_json::json!({
            "event": self.name,
            "event_id": self.id.to_string(),
            "duration_ms": duration_ms,
            "metadata": serde_json::Value::Object(self.metadata.read().clone()),
        });
        if let Some(span) = &self.span {
            payload["trace_id"] = serde_json::json!(span.context().trace_id.to_string());
        }
        if let Some(message) = error {
            payload["error"] = serde_json::json!(message);
        }
        self.sink.try_emit(EVENT_DONE, Some(payload));
        true
    }

    /// Runs `fut` inside this event: a returned error is tagged, then the
    /// event is closed. If the future is dropped before completing the event
    /// is still closed.
    pub async fn scoped<T, E, F>(self: &Arc<Self>, fut: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        let guard = EventGuard::new(Arc::clone(self));
        let result = fut.await;
        guard.finish(&result);
        result
    }
}

impl std::fmt::Debug for EventScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("done", &self.is_done())
            .field("error", &self.error())
            .finish()
    }
}

impl Drop for EventScope {
    fn drop(&mut self) {
        if !self.is_done() {
            debug!(event = %self.name, "Event dropped while open; closing");
            self.done();
        }
    }
}

/// Closes an event when dropped.
#[derive(Debug)]
pub struct EventGuard {
    scope: Option<Arc<EventScope>>,
}

impl EventGuard {
    /// Guards the given event.
    #[must_use]
    pub fn new(scope: Arc<EventScope>) -> Self {
        Self { scope: Some(scope) }
    }

    /// Tags the error from `result`, if any, then closes the event.
    pub fn finish<T, E: std::fmt::Display>(mut self, result: &Result<T, E>) {
        if let Some(scope) = self.scope.take() {
            if let Err(err) = result {
                scope.set_error(err);
            }
            scope.done();
        }
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.done();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::observability::SpanGuard;
    use crate::testing::CollectingTracer;

    fn scope_with(sink: &Arc<CollectingEventSink>, name: &str) -> Arc<EventScope> {
        Arc::new(EventScope::begin(name, None, sink.clone()))
    }

    #[test]
    fn test_done_closes_once() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "FlipPancakes");

        assert!(scope.done());
        assert!(!scope.done());
        assert!(!scope.done());

        assert_eq!(scope.done_calls(), 3);
        assert_eq!(sink.closed_events("FlipPancakes").len(), 1);
    }

    #[test]
    fn test_error_tagged_before_close() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "FlipPancakes");

        assert!(scope.set_error(&"Burnt Pancake"));
        scope.done();

        let closed = sink.closed_events("FlipPancakes");
        assert_eq!(closed[0]["error"], "Burnt Pancake");
    }

    #[test]
    fn test_error_after_close_is_ignored() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "FlipPancakes");
        scope.done();

        assert!(!scope.set_error(&"too late"));
        assert!(scope.error().is_none());
        assert_eq!(sink.count(EVENT_LATE_ERROR), 1);
        assert!(sink.closed_events("FlipPancakes")[0].get("error").is_none());
    }

    #[test]
    fn test_metadata_reported() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "PancakeReady");
        scope.append("served", 1);
        scope.done();

        assert_eq!(sink.closed_events("PancakeReady")[0]["metadata"]["served"], 1);
    }

    #[test]
    fn test_drop_closes_open_event() {
        let sink = Arc::new(CollectingEventSink::new());
        drop(scope_with(&sink, "Abandoned"));
        assert_eq!(sink.closed_events("Abandoned").len(), 1);
    }

    #[test]
    fn test_event_span_finished_with_error() {
        let tracer = Arc::new(CollectingTracer::new());
        let sink = Arc::new(CollectingEventSink::new());
        let span = SpanGuard::new(Span::start(tracer.clone(), "FlipPancakes", None));
        let scope = EventScope::begin("FlipPancakes", Some(span.span().clone()), sink);

        scope.set_error(&"stuck");
        scope.done();

        assert!(span.is_finished());
        let spans = tracer.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].tags.get("error"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "Guarded");
        {
            let _guard = EventGuard::new(scope.clone());
        }
        assert!(scope.is_done());
        assert_eq!(scope.done_calls(), 1);
    }

    #[test]
    fn test_guard_finish_tags_error() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "Guarded");
        let result: Result<(), String> = Err("nope".to_string());

        EventGuard::new(scope.clone()).finish(&result);

        assert_eq!(scope.error(), Some("nope".to_string()));
        assert_eq!(scope.done_calls(), 1);
    }

    #[tokio::test]
    async fn test_scoped_tags_and_closes() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "Scoped");

        let result: Result<u8, String> = scope.scoped(async { Err("bad batch".to_string()) }).await;

        assert!(result.is_err());
        assert!(scope.is_done());
        assert_eq!(sink.closed_events("Scoped")[0]["error"], "bad batch");
    }

    #[tokio::test]
    async fn test_scoped_closes_when_future_dropped() {
        let sink = Arc::new(CollectingEventSink::new());
        let scope = scope_with(&sink, "Dropped");

        let pending = scope.scoped(std::future::pending::<Result<(), String>>());
        let mut pending = tokio_test::task::spawn(pending);
        tokio_test::assert_pending!(pending.poll());
        drop(pending);

        assert!(scope.is_done());
        assert_eq!(sink.closed_events("Dropped").len(), 1);
    }
}
