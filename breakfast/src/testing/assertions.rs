//! Assertions over recorded events and spans.

use crate::events::CollectingEventSink;
use crate::observability::SpanRecord;
use std::time::Duration;

/// Asserts that the event named `name` was closed exactly once and returns
/// its payload.
pub fn assert_event_closed_once(sink: &CollectingEventSink, name: &str) -> serde_json::Value {
    let mut closed = sink.closed_events(name);
    assert_eq!(
        closed.len(),
        1,
        "Expected event '{}' to be closed once, got {} closes",
        name,
        closed.len()
    );
    closed.remove(0)
}

/// Asserts that the closed event named `name` carries `expected` as its error.
pub fn assert_event_error(sink: &CollectingEventSink, name: &str, expected: &str) {
    let event = assert_event_closed_once(sink, name);
    assert_eq!(
        event.get("error").and_then(|e| e.as_str()),
        Some(expected),
        "Expected event '{}' to carry error '{}'",
        name,
        expected
    );
}

/// Asserts that `child` belongs to `parent`'s trace and names it as parent.
pub fn assert_child_span(child: &SpanRecord, parent: &SpanRecord) {
    assert_eq!(
        child.context.trace_id, parent.context.trace_id,
        "Span '{}' is not in the trace of '{}'",
        child.operation, parent.operation
    );
    assert_eq!(
        child.parent_id,
        Some(parent.context.span_id),
        "Span '{}' is not a child of '{}'",
        child.operation,
        parent.operation
    );
}

/// Asserts that the span was tagged as failed.
pub fn assert_span_failed(span: &SpanRecord) {
    assert_eq!(
        span.tags.get("error"),
        Some(&serde_json::Value::Bool(true)),
        "Expected span '{}' to be tagged with an error, tags: {:?}",
        span.operation,
        span.tags
    );
}

/// Waits up to a second for the event named `name` to be closed and returns
/// its payload.
///
/// Events closed by spawned producers may land after the consumer is done.
pub async fn wait_for_closed_event(sink: &CollectingEventSink, name: &str) -> serde_json::Value {
    for _ in 0..200 {
        if let Some(event) = sink.closed_events(name).pop() {
            return event;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Event '{name}' was never closed");
}
