use anyhow::Result;
use relay_core::{error::RelayError, SamplingConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`AsyncTrainer`](crate::AsyncTrainer).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AsyncTrainerConfig {
    /// Number of optimizer threads.
    pub n_optimizers: usize,

    /// The maximum number of optimization steps, summed over all optimizers.
    pub max_opts: usize,

    /// Number of buffered transitions required before the first optimization step.
    pub warmup_period: usize,

    /// Interval of synchronizing the target network in optimization steps.
    pub sync_interval: usize,

    /// Interval of flushing records in optimization steps.
    pub record_interval: usize,

    /// Sleep of an optimizer finding no transitions, in milliseconds.
    pub idle_wait_ms: u64,

    /// How optimizers take batches from the buffer.
    pub sampling_config: SamplingConfig,
}

impl AsyncTrainerConfig {
    /// Constructs [AsyncTrainerConfig] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [AsyncTrainerConfig].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }

    /// Sets the number of optimizer threads.
    pub fn n_optimizers(mut self, v: usize) -> Self {
        self.n_optimizers = v;
        self
    }

    /// Sets the maximum number of optimization steps.
    pub fn max_opts(mut self, v: usize) -> Self {
        self.max_opts = v;
        self
    }

    /// Sets the warmup period.
    pub fn warmup_period(mut self, v: usize) -> Self {
        self.warmup_period = v;
        self
    }

    /// Sets the interval of target synchronization.
    pub fn sync_interval(mut self, v: usize) -> Self {
        self.sync_interval = v;
        self
    }

    /// Sets the interval of flushing records.
    pub fn record_interval(mut self, v: usize) -> Self {
        self.record_interval = v;
        self
    }

    /// Sets the idle sleep of optimizers.
    pub fn idle_wait_ms(mut self, v: u64) -> Self {
        self.idle_wait_ms = v;
        self
    }

    /// Sets the sampling configuration.
    pub fn sampling_config(mut self, v: SamplingConfig) -> Self {
        self.sampling_config = v;
        self
    }

    /// Checks that thread count and intervals are positive.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.n_optimizers == 0 {
            return Err(RelayError::invalid("n_optimizers must be at least 1"));
        }
        if self.sync_interval == 0 || self.record_interval == 0 {
            return Err(RelayError::invalid(
                "sync_interval and record_interval must be at least 1",
            ));
        }
        self.sampling_config.validate()
    }
}

impl Default for AsyncTrainerConfig {
    /// There is no special intention behind these initial values.
    fn default() -> Self {
        Self {
            n_optimizers: 1,
            max_opts: 10_000,
            warmup_period: 1_000,
            sync_interval: 100,
            record_interval: 100,
            idle_wait_ms: 1,
            sampling_config: SamplingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_config() -> Result<()> {
        assert!(AsyncTrainerConfig::default().validate().is_ok());
        assert!(AsyncTrainerConfig::default()
            .n_optimizers(0)
            .validate()
            .is_err());
        assert!(AsyncTrainerConfig::default()
            .sync_interval(0)
            .validate()
            .is_err());
        assert!(AsyncTrainerConfig::default()
            .sampling_config(SamplingConfig::Fifo { batch_size: 0 })
            .validate()
            .is_err());

        let dir = TempDir::new("relay_async_trainer")?;
        let path = dir.path().join("async_trainer.yaml");
        let config = AsyncTrainerConfig::default()
            .n_optimizers(2)
            .sampling_config(SamplingConfig::Prioritized { batch_size: 16 });
        config.save(&path)?;
        assert_eq!(AsyncTrainerConfig::load(&path)?, config);
        Ok(())
    }
}
