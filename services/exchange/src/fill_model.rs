//! Stochastic fill model
//!
//! Answers two questions during matching: does a resting limit order get
//! filled when the top trades exactly at its price, and does an aggressive
//! order slip one tick. Draws come from a seeded ChaCha8 stream, so a given
//! seed and query sequence always produces the same decisions — required for
//! reproducible backtests.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FillModelError {
    #[error("Probability out of range: {name} = {value} (must be in [0, 1])")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },
}

/// Fill model configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillModelConfig {
    /// Probability a resting limit order fills when the top trades at its
    /// price (a trade through the price always fills).
    pub prob_fill_at_limit: f64,
    /// Probability an aggressive order slips one tick on its first slice.
    pub prob_slippage: f64,
    pub random_seed: u64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self {
            prob_fill_at_limit: 1.0,
            prob_slippage: 0.0,
            random_seed: 42,
        }
    }
}

/// Seeded probabilistic fill decisions
#[derive(Debug, Clone)]
pub struct FillModel {
    config: FillModelConfig,
    rng: ChaCha8Rng,
}

impl FillModel {
    pub fn new(config: FillModelConfig) -> Result<Self, FillModelError> {
        for (name, value) in [
            ("prob_fill_at_limit", config.prob_fill_at_limit),
            ("prob_slippage", config.prob_slippage),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FillModelError::ProbabilityOutOfRange { name, value });
            }
        }
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.random_seed),
            config,
        })
    }

    /// Whether a resting limit order trading exactly at its price fills now
    pub fn is_limit_filled(&mut self) -> bool {
        self.rng.gen_bool(self.config.prob_fill_at_limit)
    }

    /// Whether an aggressive order slips one tick
    pub fn is_slipped(&mut self) -> bool {
        self.rng.gen_bool(self.config.prob_slippage)
    }

    pub fn config(&self) -> &FillModelConfig {
        &self.config
    }

    /// Rewind the stream to its seed state
    pub fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);
    }
}

impl Default for FillModel {
    fn default() -> Self {
        Self::new(FillModelConfig::default()).expect("default config is valid")
    }
}
