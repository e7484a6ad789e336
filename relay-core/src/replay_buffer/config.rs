//! Configuration of trajectory windows and the shared buffer.
//!
//! All configurations can be serialized to and from YAML and are validated
//! when the component they configure is built.
use super::sum_tree::is_power_of_two;
use crate::error::RelayError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of a [`TrajectoryWindow`](super::TrajectoryWindow).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct WindowConfig {
    /// Step horizon `N`: the window emits a transition as soon as it holds
    /// this many actions.
    pub n_steps: usize,

    /// Discount factor, in `(0, 1]`.
    pub gamma: f32,

    /// GAE mixing parameter, in `[0, 1]`.
    pub lambda: f32,

    /// Every reward is multiplied by this factor before it is recorded.
    pub reward_scale: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            n_steps: 20,
            gamma: 0.99,
            lambda: 0.75,
            reward_scale: 1.0,
        }
    }
}

impl WindowConfig {
    /// Sets the step horizon.
    pub fn n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Sets the GAE mixing parameter.
    pub fn lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    /// Sets the reward scale.
    pub fn reward_scale(mut self, reward_scale: f32) -> Self {
        self.reward_scale = reward_scale;
        self
    }

    /// Checks the ranges of all parameters.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.n_steps == 0 {
            return Err(RelayError::invalid("n_steps must be at least 1"));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(RelayError::invalid(format!(
                "gamma must be in (0, 1], got {}",
                self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(RelayError::invalid(format!(
                "lambda must be in [0, 1], got {}",
                self.lambda
            )));
        }
        if !self.reward_scale.is_finite() {
            return Err(RelayError::invalid("reward_scale must be finite"));
        }
        Ok(())
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

/// How newly pushed transitions are prioritized before any error was observed.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum PriorityInit {
    /// Use [`PerConfig::default_priority`].
    Default,

    /// Use the largest priority currently in the buffer, or
    /// [`PerConfig::default_priority`] if it is larger.
    Max,
}

/// Normalization of importance sampling weights.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum WeightNormalizer {
    /// Divide by the largest possible weight over all live transitions.
    All,

    /// Divide by the largest weight within the batch.
    Batch,
}

/// Configuration for prioritized sampling.
///
/// A prediction error `e` is turned into the priority `(|e| + bias)^exponent`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Added to every error so that no transition gets zero priority.
    pub bias: f32,

    /// Exponent compressing the dynamic range of priorities, typically in `(0, 1]`.
    pub exponent: f32,

    /// Priority of transitions that have not been trained on yet.
    pub default_priority: f32,

    /// Seeding rule for new transitions.
    pub init: PriorityInit,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f32,

    /// Final value of the importance sampling exponent.
    pub beta_final: f32,

    /// Number of priority updates after which `beta` reaches `beta_final`.
    pub n_opts_final: usize,

    /// Normalization of importance sampling weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            bias: 0.05,
            exponent: 0.7,
            default_priority: 1.0,
            init: PriorityInit::Default,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            normalize: WeightNormalizer::Batch,
        }
    }
}

impl PerConfig {
    /// Sets the error bias.
    pub fn bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    /// Sets the priority exponent.
    pub fn exponent(mut self, exponent: f32) -> Self {
        self.exponent = exponent;
        self
    }

    /// Sets the priority of new transitions.
    pub fn default_priority(mut self, default_priority: f32) -> Self {
        self.default_priority = default_priority;
        self
    }

    /// Sets the seeding rule for new transitions.
    pub fn init(mut self, init: PriorityInit) -> Self {
        self.init = init;
        self
    }

    /// Sets the initial importance sampling exponent.
    pub fn beta_0(mut self, beta_0: f32) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent.
    pub fn beta_final(mut self, beta_final: f32) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of updates to reach the final exponent.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the weight normalization.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Checks the ranges of all parameters.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !(self.bias >= 0.0) || !(self.exponent >= 0.0) {
            return Err(RelayError::invalid(format!(
                "bias and exponent must be nonnegative, got {} and {}",
                self.bias, self.exponent
            )));
        }
        if !(self.default_priority > 0.0) || !self.default_priority.is_finite() {
            return Err(RelayError::InvalidPriority(self.default_priority));
        }
        if !(self.beta_0 >= 0.0) || !(self.beta_final >= 0.0) {
            return Err(RelayError::invalid("beta must be nonnegative"));
        }
        Ok(())
    }

    /// Maps a prediction error to a priority.
    pub fn priority(&self, error: f32) -> Result<f32, RelayError> {
        let p = (error.abs() + self.bias).powf(self.exponent);
        if p.is_finite() {
            Ok(p)
        } else {
            Err(RelayError::InvalidPriority(p))
        }
    }
}

/// Configuration of a [`SharedBuffer`](super::SharedBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SharedBufferConfig {
    /// Maximum number of transitions.
    ///
    /// `None` lets the buffer grow without bound. With prioritized sampling the
    /// capacity is required and must be a power of two, as it is the leaf count
    /// of the sum tree.
    pub capacity: Option<usize>,

    /// Random seed for priority sampling.
    pub seed: u64,

    /// Enables prioritized sampling.
    pub per_config: Option<PerConfig>,
}

impl Default for SharedBufferConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            seed: 42,
            per_config: None,
        }
    }
}

impl SharedBufferConfig {
    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the configuration of prioritized sampling.
    pub fn per_config(mut self, per_config: Option<PerConfig>) -> Self {
        self.per_config = per_config;
        self
    }

    /// Checks the capacity and the prioritized sampling parameters.
    pub fn validate(&self) -> Result<(), RelayError> {
        match (self.capacity, &self.per_config) {
            (Some(0), _) => Err(RelayError::InvalidCapacity(0)),
            (None, Some(_)) => Err(RelayError::invalid(
                "prioritized sampling requires a bounded capacity",
            )),
            (Some(c), Some(_)) if !is_power_of_two(c) => Err(RelayError::InvalidCapacity(c)),
            (_, Some(per_config)) => per_config.validate(),
            _ => Ok(()),
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
    use tempdir::TempDir;

    #[test]
    fn test_window_config_validation() {
        assert!(WindowConfig::default().validate().is_ok());
        assert!(WindowConfig::default().n_steps(0).validate().is_err());
        assert!(WindowConfig::default().gamma(0.0).validate().is_err());
        assert!(WindowConfig::default().gamma(1.0).validate().is_ok());
        assert!(WindowConfig::default().lambda(1.5).validate().is_err());
        assert!(WindowConfig::default().lambda(0.0).validate().is_ok());
    }

    #[test]
    fn test_buffer_config_validation() {
        let per = Some(PerConfig::default());
        assert!(SharedBufferConfig::default().validate().is_ok());
        assert_eq!(
            SharedBufferConfig::default().capacity(0).validate(),
            Err(RelayError::InvalidCapacity(0))
        );
        assert_eq!(
            SharedBufferConfig::default()
                .capacity(100)
                .per_config(per.clone())
                .validate(),
            Err(RelayError::InvalidCapacity(100))
        );
        assert!(SharedBufferConfig::default()
            .per_config(per.clone())
            .validate()
            .is_err());
        assert!(SharedBufferConfig::default()
            .capacity(128)
            .per_config(per)
            .validate()
            .is_ok());
        assert!(SharedBufferConfig::default()
            .capacity(128)
            .per_config(Some(PerConfig::default().bias(-0.1)))
            .validate()
            .is_err());
    }

    #[test]
    fn test_priority_transform() {
        let per = PerConfig::default().bias(0.5).exponent(1.0);
        assert_eq!(per.priority(1.5).unwrap(), 2.0);
        assert_eq!(per.priority(-1.5).unwrap(), 2.0);
        let per = PerConfig::default().bias(0.0).exponent(0.5);
        assert_eq!(per.priority(4.0).unwrap(), 2.0);
        assert!(per.priority(f32::INFINITY).is_err());
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("relay_config")?;
        let path = dir.path().join("buffer.yaml");
        let config = SharedBufferConfig::default()
            .capacity(1024)
            .seed(7)
            .per_config(Some(PerConfig::default().init(PriorityInit::Max)));
        config.save(&path)?;
        assert_eq!(SharedBufferConfig::load(&path)?, config);
        Ok(())
    }
}
