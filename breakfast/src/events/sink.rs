//! Destinations for event records.

use super::{EVENT_DONE, EVENT_LATE_ERROR};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

/// Receives the records produced as events open and close.
///
/// Sinks are best-effort and must never fail the pipeline. Records are
/// pushed from drop guards, so `try_emit` must not block or panic.
pub trait EventSink: Send + Sync {
    /// Records an event without waiting.
    fn try_emit(&self, kind: &str, data: Option<Value>);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _kind: &str, _data: Option<Value>) {}
}

/// Writes closed events to the log.
///
/// Closed events are logged at the configured level with their name,
/// duration and error. Late error tags are always warnings.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::info()
    }
}

impl LoggingEventSink {
    /// Logs closed events at `level`; anything below info is logged at debug.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs closed events at debug.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Logs closed events at info.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn record(&self, kind: &str, data: Option<&Value>) {
        let field = |key: &str| data.and_then(|d| d.get(key)).cloned().unwrap_or(Value::Null);
        match kind {
            EVENT_LATE_ERROR => {
                warn!(event = %field("event"), error = %field("error"), "Late event error");
            }
            EVENT_DONE if self.level <= Level::INFO => {
                info!(
                    event = %field("event"),
                    duration_ms = %field("duration_ms"),
                    error = %field("error"),
                    metadata = %field("metadata"),
                    "Event done"
                );
            }
            _ => debug!(kind, data = ?data, "Event"),
        }
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, kind: &str, data: Option<Value>) {
        self.record(kind, data.as_ref());
    }
}

/// One record captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Record kind, e.g. `event.done`.
    pub kind: String,
    /// Payload.
    pub data: Option<Value>,
}

/// Keeps every record in memory, for tests and inspection.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    records: RwLock<Vec<EventRecord>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record in arrival order.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.read().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Forgets every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Returns how many records of `kind` arrived.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.records.read().iter().filter(|r| r.kind == kind).count()
    }

    /// Returns the close payloads of the event named `name`.
    ///
    /// More than one entry means the event was closed more than once.
    #[must_use]
    pub fn closed_events(&self, name: &str) -> Vec<Value> {
        self.records
            .read()
            .iter()
            .filter(|r| r.kind == EVENT_DONE)
            .filter_map(|r| r.data.clone())
            .filter(|data| data["event"] == name)
            .collect()
    }

    fn push(&self, kind: &str, data: Option<Value>) {
        self.records.write().push(EventRecord {
            kind: kind.to_string(),
            data,
        });
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, kind: &str, data: Option<Value>) {
        self.push(kind, data);
    }
}
