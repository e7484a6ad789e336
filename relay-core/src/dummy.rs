//! Deterministic environment and brain for tests.
use crate::{
    record::{Record, RecordValue},
    Brain, Env, Prediction, Step, TargetBrain, TrainOutcome, TransitionBatch,
};
use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration of [`CorridorEnv`].
#[derive(Clone, Debug)]
pub struct CorridorConfig {
    /// Number of cells. The episode terminates at the last one.
    pub length: usize,

    /// Episodes are truncated after this many steps.
    pub max_steps: usize,

    /// Probability that a move goes the opposite way.
    pub slip: f64,

    /// If set, [`Env::step`] fails at this step of every episode.
    pub fail_at_step: Option<usize>,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            length: 5,
            max_steps: 100,
            slip: 0.0,
            fail_at_step: None,
        }
    }
}

/// A corridor of cells, starting at cell 0.
///
/// Action 1 moves right and action 0 moves left. Reaching the last cell gives
/// reward 1 and terminates the episode. The observation is the cell index.
pub struct CorridorEnv {
    config: CorridorConfig,
    rng: StdRng,
    pos: usize,
    steps: usize,
}

impl Env for CorridorEnv {
    type Config = CorridorConfig;
    type Obs = f32;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        if config.length < 2 {
            bail!("corridor needs at least 2 cells, got {}", config.length);
        }
        Ok(Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed as u64),
            pos: 0,
            steps: 0,
        })
    }

    fn reset(&mut self) -> Result<f32> {
        self.pos = 0;
        self.steps = 0;
        Ok(0.0)
    }

    fn step(&mut self, act: usize) -> Result<Step<f32>> {
        if act >= 2 {
            bail!("invalid action {}", act);
        }
        if Some(self.steps) == self.config.fail_at_step {
            bail!("simulated failure at step {}", self.steps);
        }
        self.steps += 1;

        let slipped = self.config.slip > 0.0 && self.rng.gen_bool(self.config.slip);
        let right = (act == 1) != slipped;
        self.pos = if right {
            self.pos + 1
        } else {
            self.pos.saturating_sub(1)
        };

        let is_terminated = self.pos + 1 == self.config.length;
        let is_truncated = !is_terminated && self.steps >= self.config.max_steps;
        let reward = if is_terminated { 1.0 } else { 0.0 };

        Ok(Step::new(self.pos as f32, reward, is_terminated, is_truncated))
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn render_to_canvas(&self, canvas: &mut [f32]) {
        for (i, c) in canvas.iter_mut().enumerate() {
            *c = if i == self.pos { 1.0 } else { 0.0 };
        }
    }
}

/// A brain predicting a uniform policy and a constant value.
///
/// Training only counts calls and samples; the reported errors are
/// `n_step_return - value`.
pub struct ConstantBrain {
    n_actions: usize,
    value: f32,
    n_train: AtomicUsize,
    n_samples: AtomicUsize,
    n_sync: AtomicUsize,
}

impl ConstantBrain {
    /// Creates the brain.
    pub fn new(n_actions: usize, value: f32) -> Self {
        Self {
            n_actions,
            value,
            n_train: AtomicUsize::new(0),
            n_samples: AtomicUsize::new(0),
            n_sync: AtomicUsize::new(0),
        }
    }

    /// Number of [`Brain::train`] calls.
    pub fn n_train(&self) -> usize {
        self.n_train.load(Ordering::SeqCst)
    }

    /// Number of transitions trained on.
    pub fn n_samples(&self) -> usize {
        self.n_samples.load(Ordering::SeqCst)
    }

    /// Number of [`Brain::sync_target`] calls.
    pub fn n_sync(&self) -> usize {
        self.n_sync.load(Ordering::SeqCst)
    }
}

impl<O> Brain<O> for ConstantBrain {
    type State = ();

    fn initial_state(&self) -> Self::State {}

    fn predict(&self, _obs: &O, _state: &()) -> Result<Prediction<()>> {
        Ok(Prediction {
            policy: Some(vec![1.0 / self.n_actions as f32; self.n_actions]),
            value: self.value,
            next_state: (),
        })
    }

    fn train(&self, batch: &TransitionBatch<O, ()>) -> Result<TrainOutcome> {
        self.n_train.fetch_add(1, Ordering::SeqCst);
        self.n_samples
            .fetch_add(batch.n_step_return.len(), Ordering::SeqCst);

        let errors = batch
            .n_step_return
            .iter()
            .map(|r| r - self.value)
            .collect::<Vec<_>>();
        let loss = errors.iter().map(|e| e * e).sum::<f32>() / errors.len().max(1) as f32;

        let mut record = Record::from_scalar("loss", loss);
        record.insert(
            "batch_size",
            RecordValue::Scalar(batch.n_step_return.len() as f32),
        );
        Ok(TrainOutcome {
            record,
            errors: Some(errors),
        })
    }

    fn sync_target(&self) -> Result<()> {
        self.n_sync.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<O> TargetBrain<O> for ConstantBrain {
    fn predict_target(&self, _obs: &O) -> Result<f32> {
        Ok(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corridor() -> Result<()> {
        let config = CorridorConfig {
            length: 3,
            max_steps: 4,
            ..Default::default()
        };
        let mut env = CorridorEnv::build(&config, 0)?;
        assert_eq!(env.reset()?, 0.0);

        let step = env.step(0)?;
        assert_eq!(step, Step::new(0.0, 0.0, false, false));
        env.step(1)?;
        let step = env.step(1)?;
        assert_eq!(step, Step::new(2.0, 1.0, true, false));

        env.reset()?;
        for _ in 0..3 {
            assert!(!env.step(0)?.is_done());
        }
        assert!(env.step(0)?.is_truncated);

        let mut canvas = [0.0; 3];
        env.render_to_canvas(&mut canvas);
        assert_eq!(canvas, [1.0, 0.0, 0.0]);
        assert!(env.step(2).is_err());
        Ok(())
    }

    #[test]
    fn test_failing_corridor() -> Result<()> {
        let config = CorridorConfig {
            fail_at_step: Some(1),
            ..Default::default()
        };
        let mut env = CorridorEnv::build(&config, 0)?;
        env.reset()?;
        env.step(1)?;
        assert!(env.step(1).is_err());
        Ok(())
    }
}
