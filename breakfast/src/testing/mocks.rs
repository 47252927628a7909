//! Recording backends and consumers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::context::{Telemetry, TraceContext};
use crate::events::CollectingEventSink;
use crate::items::Cookable;
use crate::observability::{SpanRecord, Tracer};
use crate::pipeline::Consumer;
use crate::stages::PancakeStream;

/// A tracer that keeps every reported span.
#[derive(Debug)]
pub struct CollectingTracer {
    sampled: bool,
    spans: Mutex<Vec<SpanRecord>>,
    flushes: AtomicUsize,
}

impl CollectingTracer {
    /// Samples every trace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sampling(true)
    }

    /// Samples no trace.
    #[must_use]
    pub fn unsampled() -> Self {
        Self::with_sampling(false)
    }

    fn with_sampling(sampled: bool) -> Self {
        Self {
            sampled,
            spans: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Returns the reported spans in report order.
    #[must_use]
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().clone()
    }

    /// Returns reported spans named `operation`.
    #[must_use]
    pub fn spans_named(&self, operation: &str) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .iter()
            .filter(|s| s.operation == operation)
            .cloned()
            .collect()
    }

    /// Returns the number of reported spans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    /// Returns how many times the tracer was flushed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl Default for CollectingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for CollectingTracer {
    fn should_sample(&self, _trace_id: Uuid, _operation: &str) -> bool {
        self.sampled
    }

    fn report(&self, span: &SpanRecord) {
        self.spans.lock().push(span.clone());
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Telemetry backed by a [`CollectingTracer`] and a [`CollectingEventSink`].
#[must_use]
pub fn test_telemetry() -> (Arc<CollectingTracer>, Arc<CollectingEventSink>, Telemetry) {
    let tracer = Arc::new(CollectingTracer::new());
    let sink = Arc::new(CollectingEventSink::new());
    let telemetry = Telemetry::new(tracer.clone(), sink.clone());
    (tracer, sink, telemetry)
}

/// A consumer that keeps what it eats.
#[derive(Debug)]
pub struct CollectingDiner<C> {
    eaten: Mutex<Vec<C>>,
    meals: AtomicUsize,
    bite_time: Duration,
    walks_out: bool,
}

impl<C> CollectingDiner<C> {
    /// Eats every pancake immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            eaten: Mutex::new(Vec::new()),
            meals: AtomicUsize::new(0),
            bite_time: Duration::ZERO,
            walks_out: false,
        }
    }

    /// Takes `bite_time` per pancake.
    #[must_use]
    pub fn slow(bite_time: Duration) -> Self {
        Self {
            bite_time,
            ..Self::new()
        }
    }

    /// Drops the stream without reading it.
    #[must_use]
    pub fn walks_out() -> Self {
        Self {
            walks_out: true,
            ..Self::new()
        }
    }

    /// Returns how many times the diner was served.
    #[must_use]
    pub fn meals(&self) -> usize {
        self.meals.load(Ordering::SeqCst)
    }

    /// Takes everything eaten so far.
    pub fn take_eaten(&self) -> Vec<C> {
        std::mem::take(&mut *self.eaten.lock())
    }
}

impl<C> Default for CollectingDiner<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<C: Cookable> Consumer<C> for CollectingDiner<C> {
    async fn consume(&self, _ctx: &TraceContext, mut stream: PancakeStream<C>) -> usize {
        self.meals.fetch_add(1, Ordering::SeqCst);
        if self.walks_out {
            return 0;
        }
        let mut count = 0;
        while let Some(cake) = stream.recv().await {
            if !self.bite_time.is_zero() {
                tokio::time::sleep(self.bite_time).await;
            }
            self.eaten.lock().push(cake);
            count += 1;
        }
        count
    }
}
