//! Core functionalities.
mod brain;
mod env;
mod replay_buffer;
pub use brain::{n_step_targets, Brain, Prediction, TargetBrain, TrainOutcome};
pub use env::{Env, Step};
pub use replay_buffer::{BatchBase, ExperienceBufferBase, ReplayBufferBase};
