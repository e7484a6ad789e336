#![warn(missing_docs)]
//! Core components of asynchronous multi-producer reinforcement learning.
//!
//! Producers step their own environment, fold the steps into a
//! [`TrajectoryWindow`], and push the sealed [`Transition`]s into a
//! [`SharedBuffer`]. Optimizers take batches out of the buffer through a
//! [`SamplingPolicy`], either in arrival order or by priority with a
//! [`SumTree`], and train a shared [`Brain`].
pub mod dummy;
pub mod error;
pub mod record;
pub mod replay_buffer;
pub mod util;

mod base;
pub use base::{
    n_step_targets, BatchBase, Brain, Env, ExperienceBufferBase, Prediction, ReplayBufferBase,
    Step, TargetBrain, TrainOutcome,
};

pub use replay_buffer::{
    is_power_of_two, one_hot, IwScheduler, PerConfig, PriorityInit, SharedBuffer,
    SharedBufferConfig, SumTree, TrajectoryWindow, Transition, TransitionBatch, WeightNormalizer,
    WindowConfig, WindowState,
};

mod sampling;
pub use sampling::{
    FifoSampling, PrioritizedSampling, SamplingConfig, SamplingPolicy, SamplingStrategy,
};
