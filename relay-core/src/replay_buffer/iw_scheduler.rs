//! Annealing of the importance sampling exponent.
use super::PerConfig;
use serde::{Deserialize, Serialize};

/// Linearly anneals the exponent $\beta$ of importance sampling weights from
/// `beta_0` to `beta_final` over `n_opts_final` priority updates.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// Initial value of $\beta$.
    pub beta_0: f32,

    /// Final value of $\beta$.
    pub beta_final: f32,

    /// Priority updates after which $\beta$ stays at `beta_final`.
    pub n_opts_final: usize,

    /// Priority updates seen so far.
    pub n_opts: usize,
}

impl IwScheduler {
    /// Creates a scheduler.
    pub fn new(beta_0: f32, beta_final: f32, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// Creates a scheduler from the prioritized sampling configuration.
    pub fn from_config(per_config: &PerConfig) -> Self {
        Self::new(
            per_config.beta_0,
            per_config.beta_final,
            per_config.n_opts_final,
        )
    }

    /// Current exponent.
    pub fn beta(&self) -> f32 {
        if self.n_opts >= self.n_opts_final {
            self.beta_final
        } else {
            let d = self.beta_final - self.beta_0;
            self.beta_0 + d * (self.n_opts as f32 / self.n_opts_final as f32)
        }
    }

    /// Counts one priority update.
    pub fn add_n_opts(&mut self) {
        self.n_opts += 1;
    }
}
