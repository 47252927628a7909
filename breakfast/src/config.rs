//! Kitchen configuration.

use crate::errors::BreakfastError;
use crate::items::GriddleConfig;
use crate::observability::TracerConfig;
use crate::stages::ServePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a kitchen and its run loop.
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakfastConfig {
    /// Service name spans are reported under.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Pancakes per breakfast.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long a flipped batch cooks, in milliseconds.
    #[serde(default = "default_cook_time_ms")]
    pub cook_time_ms: u64,
    /// How the syrup station treats the rest of a batch.
    #[serde(default)]
    pub serve_policy: ServePolicy,
    /// Tracer backend settings.
    #[serde(default)]
    pub tracer: TracerConfig,
    /// Reference pancake generator settings.
    #[serde(default)]
    pub griddle: GriddleConfig,
    /// Seconds to wait before the first breakfast.
    #[serde(default)]
    pub startup_delay_secs: u64,
}

fn default_service_name() -> String {
    "Breakfast".to_string()
}

fn default_batch_size() -> usize {
    3
}

fn default_cook_time_ms() -> u64 {
    1000
}

impl Default for BreakfastConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            batch_size: default_batch_size(),
            cook_time_ms: default_cook_time_ms(),
            serve_policy: ServePolicy::default(),
            tracer: TracerConfig::default(),
            griddle: GriddleConfig::default(),
            startup_delay_secs: 0,
        }
    }
}

impl BreakfastConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BreakfastError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
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
        self.cook_time_ms = u64::try_from(cook_time.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the serve policy.
    #[must_use]
    pub fn with_serve_policy(mut self, policy: ServePolicy) -> Self {
        self.serve_policy = policy;
        self
    }

    /// Sets the tracer settings.
    #[must_use]
    pub fn with_tracer(mut self, tracer: TracerConfig) -> Self {
        self.tracer = tracer;
        self
    }

    /// Sets the griddle settings.
    #[must_use]
    pub fn with_griddle(mut self, griddle: GriddleConfig) -> Self {
        self.griddle = griddle;
        self
    }

    /// Returns the cook time as a duration.
    #[must_use]
    pub fn cook_time(&self) -> Duration {
        Duration::from_millis(self.cook_time_ms)
    }

    /// Returns the startup delay as a duration.
    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), BreakfastError> {
        if self.service_name.trim().is_empty() {
            return Err(BreakfastError::Config(
                "service_name must not be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(BreakfastError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        self.griddle.validate()?;
        self.tracer.validate()
    }
}
