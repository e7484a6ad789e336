//! Replay buffer interface.
//!
//! Buffers implementing these traits are shared between threads, so every
//! method takes `&self` and the implementation synchronizes internally.
use crate::error::RelayError;

/// A batch of samples taken from a replay buffer.
pub trait BatchBase {
    /// The number of samples in the batch.
    fn len(&self) -> usize;

    /// Returns `true` if the batch holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer slots of the samples, if the batch was drawn by priority.
    fn ix_sample(&self) -> Option<&[usize]>;
}

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Pushes a new experience into the buffer.
    fn push(&self, tr: Self::Item);

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no experiences.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for replay buffers that generate batches for training.
pub trait ReplayBufferBase: ExperienceBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch: BatchBase;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Result<Self, RelayError>
    where
        Self: Sized;

    /// Removes and returns up to `count` of the oldest experiences.
    fn pop_batch(&self, count: usize) -> Result<Self::Batch, RelayError>;

    /// Draws `count` experiences by priority, leaving them in the buffer.
    fn sample_batch(&self, count: usize) -> Result<Self::Batch, RelayError>;

    /// Refreshes the priorities of sampled experiences from their errors.
    fn update_priority(&self, ixs: &[usize], errors: &[f32]) -> Result<(), RelayError>;
}
