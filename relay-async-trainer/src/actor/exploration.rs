//! Epsilon-greedy exploration schedule.
use anyhow::Result;
use relay_core::error::RelayError;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Linearly annealed probability of taking a uniformly random action.
///
/// Epsilon goes from `eps_start` to `eps_final` over the first `final_step`
/// environment steps of an actor and stays at `eps_final` afterwards.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExplorationConfig {
    /// Epsilon at the first step.
    pub eps_start: f32,

    /// Epsilon after `final_step` steps.
    pub eps_final: f32,

    /// Length of the annealing period in environment steps.
    pub final_step: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            eps_start: 1.0,
            eps_final: 0.1,
            final_step: 100_000,
        }
    }
}

impl ExplorationConfig {
    /// No exploration beyond sampling from the policy.
    pub fn disabled() -> Self {
        Self {
            eps_start: 0.0,
            eps_final: 0.0,
            final_step: 0,
        }
    }

    /// Epsilon at environment step `step`.
    pub fn eps(&self, step: usize) -> f32 {
        if step >= self.final_step {
            self.eps_final
        } else {
            let d = self.eps_final - self.eps_start;
            self.eps_start + d * (step as f32 / self.final_step as f32)
        }
    }

    /// Checks that both ends of the schedule are probabilities.
    pub fn validate(&self) -> Result<(), RelayError> {
        let valid = |e: f32| (0.0..=1.0).contains(&e);
        if valid(self.eps_start) && valid(self.eps_final) {
            Ok(())
        } else {
            Err(RelayError::InvalidArgument(format!(
                "epsilon must be in [0, 1], got {} and {}",
                self.eps_start, self.eps_final
            )))
        }
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eps_schedule() {
        let config = ExplorationConfig {
            eps_start: 1.0,
            eps_final: 0.2,
            final_step: 100,
        };
        assert_eq!(config.eps(0), 1.0);
        assert!((config.eps(50) - 0.6).abs() < 1e-6);
        assert_eq!(config.eps(100), 0.2);
        assert_eq!(config.eps(1_000), 0.2);
        assert_eq!(ExplorationConfig::disabled().eps(0), 0.0);
        assert!(config.validate().is_ok());
        assert!(ExplorationConfig {
            eps_start: 1.5,
            ..config
        }
        .validate()
        .is_err());
    }
}
