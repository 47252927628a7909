//! Request-scoped execution context.

use super::Telemetry;
use crate::cancellation::{CancelGuard, CancellationToken};
use crate::events::EventScope;
use crate::observability::{Span, SpanGuard};
use std::sync::Arc;

/// A cancellable execution scope carrying the current span and event.
///
/// Contexts are immutable values: attaching a span or an event returns a
/// derived context and leaves the original untouched. Every derived context
/// shares (or is a child of) the original's cancellation token, so cancelling
/// a context cancels everything derived from it.
#[derive(Clone)]
pub struct TraceContext {
    token: CancellationToken,
    span: Option<Arc<Span>>,
    event: Option<Arc<EventScope>>,
    telemetry: Telemetry,
}

impl TraceContext {
    /// Creates a fresh cancellable context with no parent.
    ///
    /// The context is cancelled when the returned guard drops.
    #[must_use]
    pub fn root(telemetry: Telemetry) -> (Self, CancelGuard) {
        Self::with_token(CancellationToken::new(), telemetry)
    }

    /// Creates a context whose cancellation is a child of `parent`.
    #[must_use]
    pub fn child_of(parent: &CancellationToken, telemetry: Telemetry) -> (Self, CancelGuard) {
        Self::with_token(parent.child_token(), telemetry)
    }

    fn with_token(token: CancellationToken, telemetry: Telemetry) -> (Self, CancelGuard) {
        let guard = token.clone().drop_guard("context released");
        let ctx = Self {
            token,
            span: None,
            event: None,
            telemetry,
        };
        (ctx, guard)
    }

    /// Derives a context with its own child cancellation token.
    ///
    /// The child keeps this context's span and event.
    #[must_use]
    pub fn child(&self) -> (Self, CancelGuard) {
        let token = self.token.child_token();
        let guard = token.clone().drop_guard("child context released");
        let ctx = Self {
            token,
            ..self.clone()
        };
        (ctx, guard)
    }

    /// Returns a derived context carrying `span`.
    #[must_use]
    pub fn with_span(&self, span: Arc<Span>) -> Self {
        Self {
            span: Some(span),
            ..self.clone()
        }
    }

    /// Returns the span carried by this context.
    #[must_use]
    pub fn span(&self) -> Option<&Arc<Span>> {
        self.span.as_ref()
    }

    /// Starts a child span of this context's span.
    #[must_use = "the span is finished as soon as the guard is dropped"]
    pub fn start_span(&self, name: &str) -> SpanGuard {
        self.telemetry.start_span(name, Some(self))
    }

    /// Opens a named event, nested under this context's span if present.
    #[must_use]
    pub fn begin_event(&self, name: &str) -> Arc<EventScope> {
        let span = self.span.as_ref().map(|parent| {
            Arc::new(Span::start(
                self.telemetry.tracer().clone(),
                name,
                Some(&**parent),
            ))
        });
        Arc::new(EventScope::begin(
            name,
            span,
            self.telemetry.events().clone(),
        ))
    }

    /// Opens a named event and returns a context carrying it.
    ///
    /// Hand the returned context to whoever finishes the work; they close the
    /// event with [`maybe_finish_event`](Self::maybe_finish_event).
    #[must_use]
    pub fn begin_event_in_context(&self, name: &str) -> (Self, Arc<EventScope>) {
        let event = self.begin_event(name);
        let ctx = Self {
            event: Some(event.clone()),
            ..self.clone()
        };
        (ctx, event)
    }

    /// Returns the event carried by this context.
    #[must_use]
    pub fn event(&self) -> Option<&Arc<EventScope>> {
        self.event.as_ref()
    }

    /// Closes the carried event, if any.
    ///
    /// Returns true if this call closed an event.
    pub fn maybe_finish_event(&self) -> bool {
        self.event.as_ref().is_some_and(|event| event.done())
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns whether the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the telemetry handles.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

impl std::fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceContext")
            .field("cancelled", &self.is_cancelled())
            .field("span", &self.span.as_ref().map(|s| s.operation().to_string()))
            .field("event", &self.event.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}
