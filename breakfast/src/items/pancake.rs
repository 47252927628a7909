//! The stock item: pancakes made on a griddle.

use super::{BatchSource, Cookable};
use crate::errors::{BreakfastError, CookError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Failure rates for pancakes made on a [`Griddle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GriddleConfig {
    /// Probability a pancake sticks when flipped.
    #[serde(default = "default_stick_rate")]
    pub stick_rate: f64,
    /// Probability a pancake burns while cooking.
    #[serde(default = "default_burn_rate")]
    pub burn_rate: f64,
    /// Probability a pancake goes soggy when syruped.
    #[serde(default = "default_soggy_rate")]
    pub soggy_rate: f64,
    /// Seed for reproducible batches.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_stick_rate() -> f64 {
    0.05
}

fn default_burn_rate() -> f64 {
    0.05
}

fn default_soggy_rate() -> f64 {
    0.2
}

impl Default for GriddleConfig {
    fn default() -> Self {
        Self {
            stick_rate: default_stick_rate(),
            burn_rate: default_burn_rate(),
            soggy_rate: default_soggy_rate(),
            seed: None,
        }
    }
}

impl GriddleConfig {
    /// A griddle on which nothing ever goes wrong.
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            stick_rate: 0.0,
            burn_rate: 0.0,
            soggy_rate: 0.0,
            seed: None,
        }
    }

    /// Sets the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks that every rate is a probability.
    pub fn validate(&self) -> Result<(), BreakfastError> {
        for (name, rate) in [
            ("stick_rate", self.stick_rate),
            ("burn_rate", self.burn_rate),
            ("soggy_rate", self.soggy_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(BreakfastError::Config(format!(
                    "griddle {name} must be within [0, 1], got {rate}"
                )));
            }
        }
        Ok(())
    }
}

/// What will happen to a pancake, rolled when it is poured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Fate {
    sticks: bool,
    burns: bool,
    soggy: bool,
}

/// A pancake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pancake {
    number: usize,
    flips: u32,
    syruped: bool,
    fate: Fate,
}

impl Pancake {
    /// A pancake that will cook perfectly.
    #[must_use]
    pub fn new(number: usize) -> Self {
        Self {
            number,
            flips: 0,
            syruped: false,
            fate: Fate::default(),
        }
    }

    /// Returns the pancake's position in its batch.
    #[must_use]
    pub fn number(&self) -> usize {
        self.number
    }

    /// Returns how many times the pancake has been flipped.
    #[must_use]
    pub fn flips(&self) -> u32 {
        self.flips
    }

    /// Returns whether syrup has been applied.
    #[must_use]
    pub fn is_syruped(&self) -> bool {
        self.syruped
    }
}

impl Cookable for Pancake {
    fn flip(&mut self) -> Result<(), CookError> {
        if self.fate.sticks {
            return Err(CookError::Stuck);
        }
        self.flips += 1;
        Ok(())
    }

    fn is_burnt(&self) -> bool {
        self.flips > 0 && self.fate.burns
    }

    fn syrup(&mut self) -> Result<(), CookError> {
        if self.fate.soggy {
            return Err(CookError::Soggy);
        }
        self.syruped = true;
        Ok(())
    }
}

fn roll(rng: &mut StdRng, rate: f64) -> bool {
    // gen_bool panics outside [0, 1]; NaN counts as never.
    rate > 0.0 && rng.gen_bool(rate.min(1.0))
}

/// Pours batches of [`Pancake`]s.
#[derive(Debug)]
pub struct Griddle {
    config: GriddleConfig,
    rng: Mutex<StdRng>,
}

impl Griddle {
    /// Creates a griddle. A configured seed makes batches reproducible.
    #[must_use]
    pub fn new(config: GriddleConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Returns the griddle configuration.
    #[must_use]
    pub fn config(&self) -> &GriddleConfig {
        &self.config
    }
}

impl Default for Griddle {
    fn default() -> Self {
        Self::new(GriddleConfig::default())
    }
}

impl BatchSource for Griddle {
    type Item = Pancake;

    fn make_batch(&self, n: usize) -> Vec<Pancake> {
        let mut rng = self.rng.lock();
        (0..n)
            .map(|number| Pancake {
                fate: Fate {
                    sticks: roll(&mut *rng, self.config.stick_rate),
                    burns: roll(&mut *rng, self.config.burn_rate),
                    soggy: roll(&mut *rng, self.config.soggy_rate),
                },
                ..Pancake::new(number)
            })
            .collect()
    }
}
