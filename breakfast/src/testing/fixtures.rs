//! Scripted items and batch sources.

use crate::errors::CookError;
use crate::items::{BatchSource, Cookable};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Labels of every syrup attempt, shared by the pancakes logged to it.
///
/// Pancakes move into the syrup station, so this is how a test sees what
/// happened to the ones that were never served.
#[derive(Debug, Clone, Default)]
pub struct SyrupLog(Arc<Mutex<Vec<usize>>>);

impl SyrupLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the labels in attempt order.
    #[must_use]
    pub fn labels(&self) -> Vec<usize> {
        self.0.lock().clone()
    }

    fn record(&self, label: usize) {
        self.0.lock().push(label);
    }
}

impl PartialEq for SyrupLog {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SyrupLog {}

/// A deterministic pancake whose failures are scripted up front.
///
/// Counters are public so tests can check exactly what each stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptedPancake {
    /// Identifies the pancake in assertions.
    pub label: usize,
    /// Successful flips.
    pub flips: u32,
    /// Every call to `flip`.
    pub flip_attempts: u32,
    /// Every call to `syrup`.
    pub syrup_attempts: u32,
    /// Whether syrup has been applied.
    pub syruped: bool,
    sticks: bool,
    burns: bool,
    soggy_attempts: u32,
    panics_on_syrup: bool,
    log: Option<SyrupLog>,
}

impl ScriptedPancake {
    /// A pancake on which nothing goes wrong.
    #[must_use]
    pub fn good() -> Self {
        Self::default()
    }

    /// `n` good pancakes labelled `0..n`.
    #[must_use]
    pub fn batch(n: usize) -> Vec<Self> {
        (0..n).map(|label| Self::good().labelled(label)).collect()
    }

    /// Sets the label.
    #[must_use]
    pub fn labelled(mut self, label: usize) -> Self {
        self.label = label;
        self
    }

    /// Every flip fails with [`CookError::Stuck`].
    #[must_use]
    pub fn sticks(mut self) -> Self {
        self.sticks = true;
        self
    }

    /// Burnt once flipped.
    #[must_use]
    pub fn burns(mut self) -> Self {
        self.burns = true;
        self
    }

    /// The first `attempts` syrups fail with [`CookError::Soggy`].
    #[must_use]
    pub fn soggy(mut self, attempts: u32) -> Self {
        self.soggy_attempts = attempts;
        self
    }

    /// Records every syrup attempt in `log`.
    #[must_use]
    pub fn logged(mut self, log: &SyrupLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Syruping panics.
    #[must_use]
    pub fn panics_on_syrup(mut self) -> Self {
        self.panics_on_syrup = true;
        self
    }
}

impl Cookable for ScriptedPancake {
    fn flip(&mut self) -> Result<(), CookError> {
        self.flip_attempts += 1;
        if self.sticks {
            return Err(CookError::Stuck);
        }
        self.flips += 1;
        Ok(())
    }

    fn is_burnt(&self) -> bool {
        self.burns && self.flips > 0
    }

    fn syrup(&mut self) -> Result<(), CookError> {
        self.syrup_attempts += 1;
        if let Some(log) = &self.log {
            log.record(self.label);
        }
        assert!(!self.panics_on_syrup, "syrup bottle exploded");
        if self.syrup_attempts <= self.soggy_attempts {
            return Err(CookError::Soggy);
        }
        self.syruped = true;
        Ok(())
    }
}

/// A batch source that serves queued batches, then good ones.
///
/// A queued batch is served as is, whatever size was asked for.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queued: Mutex<VecDeque<Vec<ScriptedPancake>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    /// Creates a source with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch to serve next.
    #[must_use]
    pub fn then(self, batch: Vec<ScriptedPancake>) -> Self {
        self.queued.lock().push_back(batch);
        self
    }

    /// Returns how many batches have been made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BatchSource for ScriptedSource {
    type Item = ScriptedPancake;

    fn make_batch(&self, n: usize) -> Vec<ScriptedPancake> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedPancake::batch(n))
    }
}
