//! Prediction and training model.
use crate::{record::Record, TransitionBatch};
use anyhow::Result;

/// Output of [`Brain::predict`].
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction<S> {
    /// Action probabilities, `None` for value-only brains.
    pub policy: Option<Vec<f32>>,

    /// Estimated value of the observation.
    pub value: f32,

    /// Recurrent state after consuming the observation.
    pub next_state: S,
}

/// Output of [`Brain::train`].
#[derive(Debug)]
pub struct TrainOutcome {
    /// Training metrics.
    pub record: Record,

    /// Per-sample prediction errors, in batch order.
    ///
    /// When present and the batch was drawn by priority, the errors become the
    /// new priorities of the sampled transitions.
    pub errors: Option<Vec<f32>>,
}

impl TrainOutcome {
    /// An outcome carrying only a record.
    pub fn from_record(record: Record) -> Self {
        Self {
            record,
            errors: None,
        }
    }
}

/// The prediction and training model, shared by all producers and optimizers.
///
/// Methods take `&self`: one brain is shared between threads behind an
/// [`Arc`](std::sync::Arc), and implementations synchronize internally.
pub trait Brain<O> {
    /// Recurrent state threaded through consecutive predictions. Use `()` for
    /// feed-forward models.
    type State: Clone;

    /// State at the beginning of an episode.
    fn initial_state(&self) -> Self::State;

    /// Predicts policy and value for an observation.
    fn predict(&self, obs: &O, state: &Self::State) -> Result<Prediction<Self::State>>;

    /// Performs an optimization step on a batch.
    fn train(&self, batch: &TransitionBatch<O, Self::State>) -> Result<TrainOutcome>;

    /// Copies the online parameters into the target network.
    ///
    /// Brains without a target network keep this no-op.
    fn sync_target(&self) -> Result<()> {
        Ok(())
    }
}

/// A brain with a separate target network.
pub trait TargetBrain<O>: Brain<O> {
    /// Value estimate of the target network.
    fn predict_target(&self, obs: &O) -> Result<f32>;
}

/// Bootstrapped n-step targets of a batch,
/// `n_step_return + gamma^segment_length * V_target(to_observation)`, where the
/// bootstrap term is dropped for segments ending in a terminal state.
pub fn n_step_targets<O, B>(
    brain: &B,
    batch: &TransitionBatch<O, B::State>,
    gamma: f32,
) -> Result<Vec<f32>>
where
    B: TargetBrain<O> + ?Sized,
{
    let mut targets = Vec::with_capacity(batch.n_step_return.len());
    for (i, obs) in batch.to_observation.iter().enumerate() {
        let bootstrap = if batch.ends_in_terminal[i] {
            0.0
        } else {
            gamma.powi(batch.segment_length[i] as i32) * brain.predict_target(obs)?
        };
        targets.push(batch.n_step_return[i] + bootstrap);
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::ConstantBrain;
    use crate::{one_hot, Transition};

    fn tr(to: f32, len: usize, ends_in_terminal: bool) -> Transition<f32, ()> {
        Transition {
            from_observation: 0.0,
            from_recurrent_state: (),
            to_observation: to,
            to_recurrent_state: (),
            predicted_policy: vec![0.5, 0.5],
            predicted_value: 0.0,
            action: one_hot(0, 2),
            n_step_return: 1.0,
            gae_advantage: 0.0,
            terminal: ends_in_terminal,
            ends_in_terminal,
            segment_length: len,
        }
    }

    #[test]
    fn test_n_step_targets() {
        let brain = ConstantBrain::new(2, 2.0);
        let batch: TransitionBatch<f32, ()> = vec![tr(1.0, 2, false), tr(1.0, 3, true)]
            .into_iter()
            .collect();
        let targets = n_step_targets(&brain, &batch, 0.5).unwrap();
        // The constant brain's target value is its value estimate, 2.0.
        assert!((targets[0] - (1.0 + 0.25 * 2.0)).abs() < 1e-6);
        assert!((targets[1] - 1.0).abs() < 1e-6);
    }
}
