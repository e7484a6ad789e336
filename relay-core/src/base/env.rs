//! Environment.
use anyhow::Result;

/// Outcome of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<O> {
    /// Observation after the action.
    pub obs: O,

    /// Reward of the action.
    pub reward: f32,

    /// The episode reached a terminal state.
    pub is_terminated: bool,

    /// The episode was cut off without reaching a terminal state.
    pub is_truncated: bool,
}

impl<O> Step<O> {
    /// Constructs a [`Step`] object.
    pub fn new(obs: O, reward: f32, is_terminated: bool, is_truncated: bool) -> Self {
        Self {
            obs,
            reward,
            is_terminated,
            is_truncated,
        }
    }

    #[inline]
    /// Terminated or truncated.
    pub fn is_done(&self) -> bool {
        self.is_terminated || self.is_truncated
    }
}

/// A simulated environment with a discrete action space.
///
/// Each producer thread builds and owns its own environment, so implementations
/// only need to be [`Send`].
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Applies the action with index `act`.
    fn step(&mut self, act: usize) -> Result<Step<Self::Obs>>;

    /// The number of discrete actions.
    fn num_actions(&self) -> usize;

    /// Draws the current state into `canvas`. Used for visualization only.
    #[allow(unused_variables)]
    fn render_to_canvas(&self, canvas: &mut [f32]) {}
}
