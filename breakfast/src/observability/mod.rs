//! Observability utilities: spans and tracer backends.

mod span;
mod tracer;

pub use span::{Span, SpanContext, SpanGuard, SpanRecord, SpanTimer};
pub use tracer::{
    init_tracer, LoggingTracer, NoOpTracer, SamplerType, Tracer, TracerCloser, TracerConfig,
};
