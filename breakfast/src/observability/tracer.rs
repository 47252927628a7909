//! Tracer backends and tracer bootstrap.
//!
//! A [`Tracer`] decides whether a new trace is sampled and receives finished
//! spans. Reporting is best-effort: backends log their own failures and never
//! surface them to pipeline code.

use super::span::SpanRecord;
use crate::errors::BreakfastError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Trait for tracer backends.
pub trait Tracer: Send + Sync {
    /// Decides whether a new trace rooted at `operation` is sampled.
    fn should_sample(&self, trace_id: Uuid, operation: &str) -> bool;

    /// Receives a finished, sampled span.
    fn report(&self, span: &SpanRecord);

    /// Flushes buffered spans. Called once by [`TracerCloser`].
    fn flush(&self) {}
}

/// No-op tracer: samples nothing, reports nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOpTracer;

impl Tracer for NoOpTracer {
    fn should_sample(&self, _trace_id: Uuid, _operation: &str) -> bool {
        false
    }

    fn report(&self, _span: &SpanRecord) {}
}

/// Sampling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    /// Same decision for every trace: `param` 1 samples all, 0 samples none.
    #[default]
    Const,
    /// Each trace is sampled with probability `param`.
    Probabilistic,
}

impl FromStr for SamplerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "const" => Ok(Self::Const),
            "probabilistic" => Ok(Self::Probabilistic),
            other => Err(format!("unknown sampler type '{other}'")),
        }
    }
}

impl std::fmt::Display for SamplerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Const => write!(f, "const"),
            Self::Probabilistic => write!(f, "probabilistic"),
        }
    }
}

/// Tracer backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Sampling strategy.
    #[serde(default)]
    pub sampler_type: SamplerType,
    /// Sampling rate or flag, interpreted by `sampler_type`.
    #[serde(default = "default_sampler_param")]
    pub sampler_param: f64,
    /// Whether finished spans are also written to the log at info level.
    #[serde(default = "default_log_spans")]
    pub reporter_log_spans: bool,
}

fn default_sampler_param() -> f64 {
    1.0
}

fn default_log_spans() -> bool {
    true
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            sampler_type: SamplerType::Const,
            sampler_param: default_sampler_param(),
            reporter_log_spans: default_log_spans(),
        }
    }
}

impl TracerConfig {
    /// Creates a new tracer configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler_type: SamplerType, param: f64) -> Self {
        self.sampler_type = sampler_type;
        self.sampler_param = param;
        self
    }

    /// Sets whether spans are logged.
    #[must_use]
    pub fn with_log_spans(mut self, log_spans: bool) -> Self {
        self.reporter_log_spans = log_spans;
        self
    }

    /// Checks the sampler settings.
    pub fn validate(&self) -> Result<(), BreakfastError> {
        self.sampler().map(|_| ())
    }

    fn sampler(&self) -> Result<Sampler, BreakfastError> {
        let param = self.sampler_param;
        match self.sampler_type {
            SamplerType::Const if param == 0.0 => Ok(Sampler::Const(false)),
            SamplerType::Const if param == 1.0 => Ok(Sampler::Const(true)),
            SamplerType::Const => Err(BreakfastError::TracerInit(format!(
                "const sampler param must be 0 or 1, got {param}"
            ))),
            SamplerType::Probabilistic if (0.0..=1.0).contains(&param) => {
                Ok(Sampler::Probabilistic(param))
            }
            SamplerType::Probabilistic => Err(BreakfastError::TracerInit(format!(
                "probabilistic sampler param must be within [0, 1], got {param}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Sampler {
    Const(bool),
    Probabilistic(f64),
}

impl Sampler {
    fn sample(self) -> bool {
        match self {
            Self::Const(decision) => decision,
            Self::Probabilistic(rate) => rand::thread_rng().gen_bool(rate),
        }
    }
}

/// Tracer that reports finished spans through `tracing`.
#[derive(Debug)]
pub struct LoggingTracer {
    service_name: String,
    sampler: Sampler,
    log_spans: bool,
    reported: AtomicU64,
}

impl LoggingTracer {
    /// Returns the service name spans are reported under.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the number of spans reported so far.
    #[must_use]
    pub fn reported_count(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }
}

impl Tracer for LoggingTracer {
    fn should_sample(&self, trace_id: Uuid, operation: &str) -> bool {
        let sampled = self.sampler.sample();
        tracing::trace!(%trace_id, operation, sampled, "Sampling decision");
        sampled
    }

    fn report(&self, span: &SpanRecord) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        let parent_id = span.parent_id.map(|id| id.to_string());
        if self.log_spans {
            tracing::info!(
                service = %self.service_name,
                operation = %span.operation,
                trace_id = %span.context.trace_id,
                span_id = %span.context.span_id,
                parent_id = ?parent_id,
                duration_ms = span.duration_ms,
                tags = ?span.tags,
                "Reporting span"
            );
        } else {
            tracing::debug!(
                service = %self.service_name,
                operation = %span.operation,
                trace_id = %span.context.trace_id,
                duration_ms = span.duration_ms,
                "Reporting span"
            );
        }
    }

    fn flush(&self) {
        tracing::info!(
            service = %self.service_name,
            reported = self.reported_count(),
            "Tracer flushed"
        );
    }
}

/// Flushes the tracer once, on [`close`](TracerCloser::close) or drop.
pub struct TracerCloser {
    tracer: Arc<dyn Tracer>,
    closed: AtomicBool,
}

impl TracerCloser {
    /// Creates a closer for the given tracer.
    #[must_use]
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer,
            closed: AtomicBool::new(false),
        }
    }

    /// Flushes the tracer. Subsequent calls are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.tracer.flush();
        }
    }
}

impl Drop for TracerCloser {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TracerCloser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracerCloser")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Initializes the logging tracer for `service_name`.
///
/// Fails on an empty service name or invalid sampler settings; callers treat
/// this as fatal.
pub fn init_tracer(
    service_name: &str,
    config: &TracerConfig,
) -> Result<(Arc<dyn Tracer>, TracerCloser), BreakfastError> {
    if service_name.trim().is_empty() {
        return Err(BreakfastError::TracerInit(
            "service name must not be empty".to_string(),
        ));
    }
    let sampler = config.sampler()?;

    let tracer: Arc<dyn Tracer> = Arc::new(LoggingTracer {
        service_name: service_name.to_string(),
        sampler,
        log_spans: config.reporter_log_spans,
        reported: AtomicU64::new(0),
    });
    tracing::debug!(
        service = service_name,
        sampler = %config.sampler_type,
        param = config.sampler_param,
        log_spans = config.reporter_log_spans,
        "Tracer initialized"
    );

    let closer = TracerCloser::new(tracer.clone());
    Ok((tracer, closer))
}
