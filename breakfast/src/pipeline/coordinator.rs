//! The kitchen: runs one breakfast request end to end.

use crate::cancellation::CancellationToken;
use crate::config::BreakfastConfig;
use crate::context::{Telemetry, TraceContext};
use crate::errors::BreakfastError;
use crate::items::{BatchSource, Cookable};
use crate::stages::{flip_pancakes, syrup_pancakes, PancakeStream, ServePolicy};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Root span name for one request.
pub const ROOT_SPAN: &str = "ServeHotCakes";

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    /// Nothing started yet.
    Idle,
    /// Stage one is flipping and cooking.
    Flipping,
    /// Stage one failed; the request is over.
    FlipFailed,
    /// Stage two has been launched.
    Syruping,
    /// The consumer is draining the stream.
    Eating,
    /// The consumer finished.
    Done,
}

impl ServeState {
    /// Returns whether the request has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FlipFailed | Self::Done)
    }
}

/// The terminal consumer of a request's output stream.
#[async_trait]
pub trait Consumer<C: Cookable>: Send + Sync {
    /// Consumes the stream. Returns how many pancakes were eaten.
    async fn consume(&self, ctx: &TraceContext, stream: PancakeStream<C>) -> usize;
}

/// Eats every pancake it is served.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diner;

#[async_trait]
impl<C: Cookable> Consumer<C> for Diner {
    async fn consume(&self, _ctx: &TraceContext, mut stream: PancakeStream<C>) -> usize {
        let mut eaten = 0;
        while stream.recv().await.is_some() {
            eaten += 1;
            debug!(eaten, "Ate a pancake");
        }
        eaten
    }
}

/// Serves breakfast requests.
///
/// Every request runs in its own context whose cancellation is a child of
/// the kitchen's shutdown token, so [`shutdown`](Self::shutdown) reaches an
/// in-flight request.
pub struct Kitchen<S, D> {
    telemetry: Telemetry,
    source: S,
    diner: D,
    batch_size: usize,
    cook_time: Duration,
    policy: ServePolicy,
    shutdown: CancellationToken,
}

impl<S, D> Kitchen<S, D>
where
    S: BatchSource,
    D: Consumer<S::Item>,
{
    /// Creates a kitchen with default batch size, cook time and policy.
    #[must_use]
    pub fn new(telemetry: Telemetry, source: S, diner: D) -> Self {
        Self::from_config(&BreakfastConfig::default(), telemetry, source, diner)
    }

    /// Creates a kitchen from configuration.
    #[must_use]
    pub fn from_config(
        config: &BreakfastConfig,
        telemetry: Telemetry,
        source: S,
        diner: D,
    ) -> Self {
        Self {
            telemetry,
            source,
            diner,
            batch_size: config.batch_size,
            cook_time: config.cook_time(),
            policy: config.serve_policy,
            shutdown: CancellationToken::new(),
        }
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the cook time.
    #[must_use]
    pub fn with_cook_time(mut self, cook_time: Duration) -> Self {
        self.cook_time = cook_time;
        self
    }

    /// Sets the serve policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ServePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the consumer.
    pub fn diner(&self) -> &D {
        &self.diner
    }

    /// Returns the batch source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the shutdown token.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Cancels the in-flight request, if any, and every later one.
    pub fn shutdown(&self, reason: impl Into<String>) {
        self.shutdown.cancel(reason);
    }

    /// Returns whether the kitchen has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Serves one breakfast.
    ///
    /// Flips a fresh batch, then streams syruped pancakes to the consumer.
    /// A stage one failure tags the root span and is returned; stage two
    /// never fails the request.
    pub async fn serve_breakfast(&self) -> Result<(), BreakfastError> {
        // Declared first so the root span finishes before the context is cancelled.
        let (ctx, _cancel) = TraceContext::child_of(&self.shutdown, self.telemetry.clone());
        let root = self.telemetry.start_span(ROOT_SPAN, None);
        let ctx = ctx.with_span(root.span().clone());
        let mut state = ServeState::Idle;
        let trace_id = root.context().trace_id;

        let mut cakes = self.source.make_batch(self.batch_size);
        root.set_tag("pancakes", cakes.len());

        advance(&mut state, ServeState::Flipping);
        if let Err(err) = flip_pancakes(&ctx, &mut cakes, self.cook_time).await {
            root.set_error(&err);
            advance(&mut state, ServeState::FlipFailed);
            info!(%trace_id, error = %err, "Breakfast failed at the griddle");
            return Err(err);
        }

        advance(&mut state, ServeState::Syruping);
        let ready = syrup_pancakes(&ctx, cakes, self.policy);

        advance(&mut state, ServeState::Eating);
        let eaten = self.diner.consume(&ctx, ready).await;
        root.set_tag("eaten", eaten);

        advance(&mut state, ServeState::Done);
        Ok(())
    }
}

fn advance(state: &mut ServeState, next: ServeState) {
    debug!(from = ?*state, to = ?next, "Serve state");
    *state = next;
}

impl<S, D> std::fmt::Debug for Kitchen<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kitchen")
            .field("batch_size", &self.batch_size)
            .field("cook_time", &self.cook_time)
            .field("policy", &self.policy)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
