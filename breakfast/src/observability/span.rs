//! Hierarchical trace spans.

use super::tracer::Tracer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Identity of a span within its trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    /// Trace this span belongs to; shared by the whole call tree.
    pub trace_id: Uuid,
    /// Unique span id.
    pub span_id: Uuid,
    /// Sampling decision, made once at the root and inherited.
    pub sampled: bool,
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A finished span as handed to the tracer backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Operation name.
    pub operation: String,
    /// Span identity.
    pub context: SpanContext,
    /// Parent span id, if this is not a root span.
    pub parent_id: Option<Uuid>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Tags set while the span was open.
    #[serde(default)]
    pub tags: BTreeMap<String, serde_json::Value>,
}

/// A named, timed node in a trace's call hierarchy.
///
/// A span is finished at most once; further calls to [`Span::finish`] are
/// no-ops. Use [`SpanGuard`] to finish on scope exit.
pub struct Span {
    context: SpanContext,
    parent_id: Option<Uuid>,
    started_at: DateTime<Utc>,
    timer: SpanTimer,
    tags: RwLock<BTreeMap<String, serde_json::Value>>,
    finished: AtomicBool,
    tracer: Arc<dyn Tracer>,
}

impl Span {
    /// Starts a span. With a parent the span joins the parent's trace and
    /// inherits its sampling decision; otherwise it opens a new trace.
    pub(crate) fn start(
        tracer: Arc<dyn Tracer>,
        operation: impl Into<String>,
        parent: Option<&Span>,
    ) -> Self {
        let operation = operation.into();
        let (trace_id, parent_id, sampled) = match parent {
            Some(p) => (p.context.trace_id, Some(p.context.span_id), p.context.sampled),
            None => {
                let trace_id = Uuid::new_v4();
                let sampled = tracer.should_sample(trace_id, &operation);
                (trace_id, None, sampled)
            }
        };

        Self {
            context: SpanContext {
                trace_id,
                span_id: Uuid::new_v4(),
                sampled,
            },
            parent_id,
            started_at: Utc::now(),
            timer: SpanTimer::start(operation),
            tags: RwLock::new(BTreeMap::new()),
            finished: AtomicBool::new(false),
            tracer,
        }
    }

    /// Returns the span identity.
    #[must_use]
    pub fn context(&self) -> SpanContext {
        self.context
    }

    /// Returns the parent span id.
    #[must_use]
    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    /// Returns the operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        self.timer.name()
    }

    /// Sets a tag. Tags set after the span finished are not reported.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.tags.write().insert(key.into(), value.into());
    }

    /// Marks the span as failed with the given error.
    pub fn set_error(&self, error: &dyn std::fmt::Display) {
        let mut tags = self.tags.write();
        tags.insert("error".to_string(), serde_json::Value::Bool(true));
        tags.insert("error.message".to_string(), serde_json::json!(error.to_string()));
    }

    /// Returns whether the span has been finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Finishes the span and reports it if sampled.
    ///
    /// Returns false if the span was already finished.
    pub fn finish(&self) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        if self.context.sampled {
            let record = SpanRecord {
                operation: self.operation().to_string(),
                context: self.context,
                parent_id: self.parent_id,
                started_at: self.started_at,
                duration_ms: self.timer.elapsed_ms(),
                tags: self.tags.read().clone(),
            };
            self.tracer.report(&record);
        }
        true
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("operation", &self.operation())
            .field("context", &self.context)
            .field("parent_id", &self.parent_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Owns a span and finishes it when dropped.
#[derive(Debug)]
pub struct SpanGuard {
    span: Arc<Span>,
}

impl SpanGuard {
    pub(crate) fn new(span: Span) -> Self {
        Self {
            span: Arc::new(span),
        }
    }

    /// Returns a shared handle to the span, e.g. for attaching to a context.
    #[must_use]
    pub fn span(&self) -> &Arc<Span> {
        &self.span
    }
}

impl Deref for SpanGuard {
    type Target = Span;

    fn deref(&self) -> &Span {
        &self.span
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.span.finish();
    }
}
