//! Choice between FIFO draining and prioritized sampling.
use crate::{error::RelayError, BatchBase, ReplayBufferBase};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How an optimizer takes batches from a replay buffer.
pub trait SamplingPolicy {
    /// Number of transitions requested per batch.
    fn batch_size(&self) -> usize;

    /// Takes the next batch from the buffer.
    fn drain<R: ReplayBufferBase>(&self, buffer: &R) -> Result<R::Batch, RelayError>;

    /// Hands the prediction errors of a trained batch back to the buffer.
    fn feedback<R: ReplayBufferBase>(
        &self,
        buffer: &R,
        batch: &R::Batch,
        errors: Option<&[f32]>,
    ) -> Result<(), RelayError>;
}

/// Consumes transitions in arrival order, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FifoSampling {
    batch_size: usize,
}

impl FifoSampling {
    /// Creates the policy.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl SamplingPolicy for FifoSampling {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Pops up to `batch_size` transitions. The batch is empty if nothing is
    /// buffered.
    fn drain<R: ReplayBufferBase>(&self, buffer: &R) -> Result<R::Batch, RelayError> {
        buffer.pop_batch(self.batch_size)
    }

    /// Popped transitions are gone, so errors are dropped.
    fn feedback<R: ReplayBufferBase>(
        &self,
        _buffer: &R,
        _batch: &R::Batch,
        _errors: Option<&[f32]>,
    ) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Samples transitions in proportion to their priorities and refreshes the
/// priorities from the errors observed in training.
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedSampling {
    batch_size: usize,
}

impl PrioritizedSampling {
    /// Creates the policy.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

impl SamplingPolicy for PrioritizedSampling {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn drain<R: ReplayBufferBase>(&self, buffer: &R) -> Result<R::Batch, RelayError> {
        buffer.sample_batch(self.batch_size)
    }

    fn feedback<R: ReplayBufferBase>(
        &self,
        buffer: &R,
        batch: &R::Batch,
        errors: Option<&[f32]>,
    ) -> Result<(), RelayError> {
        let errors = match errors {
            Some(errors) => errors,
            None => {
                log::trace!("No errors to update priorities with");
                return Ok(());
            }
        };
        let ixs = batch
            .ix_sample()
            .ok_or_else(|| RelayError::invalid("batch was not drawn by priority"))?;
        buffer.update_priority(ixs, errors)
    }
}

/// Configuration of [`SamplingStrategy`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum SamplingConfig {
    /// FIFO draining.
    Fifo {
        /// Transitions per batch.
        batch_size: usize,
    },

    /// Prioritized sampling. The buffer must be configured with
    /// [`PerConfig`](crate::PerConfig).
    Prioritized {
        /// Transitions per batch.
        batch_size: usize,
    },
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self::Fifo { batch_size: 32 }
    }
}

impl SamplingConfig {
    /// Checks that the batch size is positive.
    pub fn validate(&self) -> Result<(), RelayError> {
        match self {
            Self::Fifo { batch_size } | Self::Prioritized { batch_size } if *batch_size == 0 => {
                Err(RelayError::invalid("batch_size must be at least 1"))
            }
            _ => Ok(()),
        }
    }

    /// Returns `true` for prioritized sampling.
    pub fn is_prioritized(&self) -> bool {
        matches!(self, Self::Prioritized { .. })
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

/// A sampling policy selected by configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    /// See [`FifoSampling`].
    Fifo(FifoSampling),

    /// See [`PrioritizedSampling`].
    Prioritized(PrioritizedSampling),
}

impl SamplingStrategy {
    /// Builds the policy described by `config`.
    pub fn build(config: &SamplingConfig) -> Result<Self, RelayError> {
        config.validate()?;
        Ok(match config {
            SamplingConfig::Fifo { batch_size } => Self::Fifo(FifoSampling::new(*batch_size)),
            SamplingConfig::Prioritized { batch_size } => {
                Self::Prioritized(PrioritizedSampling::new(*batch_size))
            }
        })
    }
}

impl SamplingPolicy for SamplingStrategy {
    fn batch_size(&self) -> usize {
        match self {
            Self::Fifo(p) => p.batch_size(),
            Self::Prioritized(p) => p.batch_size(),
        }
    }

    fn drain<R: ReplayBufferBase>(&self, buffer: &R) -> Result<R::Batch, RelayError> {
        match self {
            Self::Fifo(p) => p.drain(buffer),
            Self::Prioritized(p) => p.drain(buffer),
        }
    }

    fn feedback<R: ReplayBufferBase>(
        &self,
        buffer: &R,
        batch: &R::Batch,
        errors: Option<&[f32]>,
    ) -> Result<(), RelayError> {
        match self {
            Self::Fifo(p) => p.feedback(buffer, batch, errors),
            Self::Prioritized(p) => p.feedback(buffer, batch, errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        one_hot, ExperienceBufferBase, PerConfig, SharedBuffer, SharedBufferConfig, Transition,
    };
    use tempdir::TempDir;

    fn tr(i: usize) -> Transition<usize, ()> {
        Transition {
            from_observation: i,
            from_recurrent_state: (),
            to_observation: i + 1,
            to_recurrent_state: (),
            predicted_policy: vec![],
            predicted_value: 0.0,
            action: one_hot(0, 2),
            n_step_return: 1.0,
            gae_advantage: 0.0,
            terminal: false,
            ends_in_terminal: false,
            segment_length: 1,
        }
    }

    #[test]
    fn test_fifo_strategy() {
        let buffer = SharedBuffer::build(&SharedBufferConfig::default()).unwrap();
        let policy = SamplingStrategy::build(&SamplingConfig::Fifo { batch_size: 3 }).unwrap();
        for i in 0..5 {
            buffer.push(tr(i));
        }
        let batch = policy.drain(&buffer).unwrap();
        assert_eq!(batch.from_observation, vec![0, 1, 2]);
        policy.feedback(&buffer, &batch, Some(&[1.0, 1.0, 1.0][..])).unwrap();
        assert_eq!(policy.drain(&buffer).unwrap().from_observation, vec![3, 4]);
        assert!(policy.drain(&buffer).unwrap().is_empty());
    }

    #[test]
    fn test_prioritized_strategy() {
        let config = SharedBufferConfig::default()
            .capacity(4)
            .per_config(Some(PerConfig::default().bias(0.0).exponent(1.0)));
        let buffer = SharedBuffer::build(&config).unwrap();
        let policy =
            SamplingStrategy::build(&SamplingConfig::Prioritized { batch_size: 64 }).unwrap();
        for i in 0..2 {
            buffer.push(tr(i));
        }

        let batch = policy.drain(&buffer).unwrap();
        assert_eq!(batch.len(), 64);
        // Errors of zero for slot 0 and positive for slot 1 leave only slot 1.
        let errors = batch
            .ix_sample
            .as_ref()
            .unwrap()
            .iter()
            .map(|&ix| ix as f32)
            .collect::<Vec<_>>();
        policy.feedback(&buffer, &batch, Some(errors.as_slice())).unwrap();
        policy.feedback(&buffer, &batch, None).unwrap();
        assert_eq!(buffer.len(), 2);

        let batch = policy.drain(&buffer).unwrap();
        assert!(batch.from_observation.iter().all(|&i| i == 1));

        let popped = buffer.pop_batch(1).unwrap();
        assert!(matches!(
            policy.feedback(&buffer, &popped, Some(&[1.0][..])),
            Err(RelayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config() -> Result<()> {
        assert!(SamplingConfig::Fifo { batch_size: 0 }.validate().is_err());
        assert!(SamplingStrategy::build(&SamplingConfig::Prioritized { batch_size: 0 }).is_err());
        assert!(!SamplingConfig::default().is_prioritized());

        let dir = TempDir::new("relay_sampling")?;
        let path = dir.path().join("sampling.yaml");
        let config = SamplingConfig::Prioritized { batch_size: 64 };
        config.save(&path)?;
        assert_eq!(SamplingConfig::load(&path)?, config);
        Ok(())
    }
}
