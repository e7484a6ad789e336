use crate::{ActorStat, EpisodeMessage, ExplorationConfig};
use anyhow::{bail, Result};
use crossbeam_channel::Sender;
use log::{debug, error, info, trace, warn};
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, Rng, SeedableRng};
use relay_core::{
    error::RelayError, one_hot, Brain, Env, ExperienceBufferBase, SharedBuffer, TrajectoryWindow,
    WindowConfig,
};
use std::{
    marker::PhantomData,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};

/// Runs interaction between a [Brain] and an [Env], taking samples.
///
/// Steps are folded into a [TrajectoryWindow] and the sealed transitions are
/// pushed into the [SharedBuffer] as soon as the window emits them.
pub struct Actor<E, B>
where
    E: Env,
    B: Brain<E::Obs>,
{
    id: usize,

    /// Stops sampling process if this field is set to `true`.
    stop: Arc<Mutex<bool>>,
    env_config: E::Config,
    window_config: WindowConfig,
    exploration: ExplorationConfig,
    max_steps_per_episode: Option<usize>,
    wait_on_action: Option<Duration>,

    /// Consecutive failed episodes after which the actor gives up.
    max_episode_failures: usize,
    env_seed: i64,
    stat: Arc<Mutex<Option<ActorStat>>>,
    phantom: PhantomData<B>,
}

impl<E, B> Actor<E, B>
where
    E: Env,
    B: Brain<E::Obs>,
{
    /// Creates an actor. `stat` receives the stats when [`Actor::run`] exits.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        id: usize,
        env_config: E::Config,
        window_config: WindowConfig,
        exploration: ExplorationConfig,
        max_steps_per_episode: Option<usize>,
        wait_on_action: Option<Duration>,
        max_episode_failures: usize,
        stop: Arc<Mutex<bool>>,
        env_seed: i64,
        stat: Arc<Mutex<Option<ActorStat>>>,
    ) -> Self {
        Self {
            id,
            stop,
            env_config,
            window_config,
            exploration,
            max_steps_per_episode,
            wait_on_action,
            max_episode_failures,
            env_seed,
            stat,
            phantom: PhantomData,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.stop.lock().unwrap()
    }

    /// Runs episodes until `self.stop` becomes `true` or too many episodes in
    /// a row fail.
    ///
    /// The environment is built while holding `guard_init_env`, so actors never
    /// initialize their environments simultaneously. The stats of the actor are
    /// stored when the loop exits, including on error.
    pub fn run(
        &mut self,
        brain: Arc<B>,
        buffer: Arc<SharedBuffer<E::Obs, B::State>>,
        sender: Sender<EpisodeMessage>,
        guard_init_env: Arc<Mutex<bool>>,
    ) -> Result<()> {
        let time = SystemTime::now();
        let mut stat = ActorStat::default();
        let result = self.run_loop(&*brain, &*buffer, &sender, &guard_init_env, &mut stat);
        stat.duration = time.elapsed().unwrap_or_default();
        info!(
            "Actor {} stopped after {} episodes ({} failed)",
            self.id, stat.episodes, stat.failed_episodes
        );
        *self.stat.lock().unwrap() = Some(stat);
        result
    }

    fn run_loop(
        &self,
        brain: &B,
        buffer: &SharedBuffer<E::Obs, B::State>,
        sender: &Sender<EpisodeMessage>,
        guard_init_env: &Mutex<bool>,
        stat: &mut ActorStat,
    ) -> Result<()> {
        let mut env = {
            let _guard = guard_init_env.lock().unwrap();
            E::build(&self.env_config, self.env_seed)?
        };
        let mut window = TrajectoryWindow::build(&self.window_config)?;
        let mut rng = StdRng::seed_from_u64(self.env_seed as u64);
        let mut n_failures = 0;
        info!("Actor {} started", self.id);

        while !self.is_stopped() {
            match self.run_episode(&mut env, brain, buffer, &mut window, &mut rng, stat) {
                Ok(None) => break,
                Ok(Some(msg)) => {
                    n_failures = 0;
                    stat.episodes += 1;
                    debug!(
                        "Actor {}, episode {}: {} steps, reward = {}",
                        self.id, msg.episode, msg.steps, msg.total_reward
                    );
                    if sender.send(msg).is_err() {
                        trace!("Actor {}: episode receiver is gone", self.id);
                    }
                }
                Err(e) => {
                    n_failures += 1;
                    stat.failed_episodes += 1;
                    match e.downcast_ref::<RelayError>() {
                        Some(RelayError::CapacityExceeded { .. }) => {
                            error!("Actor {}: window contract violated: {}", self.id, e)
                        }
                        _ => warn!("Actor {}: episode aborted: {}", self.id, e),
                    }
                    if self.max_episode_failures > 0 && n_failures >= self.max_episode_failures {
                        error!(
                            "Actor {} gives up after {} failed episodes in a row",
                            self.id, n_failures
                        );
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs a single episode. Returns `None` if the actor was stopped before
    /// the episode finished.
    fn run_episode(
        &self,
        env: &mut E,
        brain: &B,
        buffer: &SharedBuffer<E::Obs, B::State>,
        window: &mut TrajectoryWindow<E::Obs, B::State>,
        rng: &mut StdRng,
        stat: &mut ActorStat,
    ) -> Result<Option<EpisodeMessage>> {
        let n_actions = env.num_actions();
        let mut obs = env.reset()?;
        let mut state = brain.initial_state();
        window.reset(obs.clone(), state.clone());

        let mut total_reward = 0.0;
        let mut steps = 0;

        loop {
            if self.is_stopped() {
                return Ok(None);
            }

            let prediction = brain.predict(&obs, &state)?;
            let eps = self.exploration.eps(stat.env_steps);
            let act = sample_action(prediction.policy.as_deref(), n_actions, eps, rng)?;
            let step = env.step(act)?;
            stat.env_steps += 1;
            steps += 1;
            total_reward += step.reward;

            state = prediction.next_state.clone();
            window.record_step(
                prediction,
                one_hot(act, n_actions),
                step.reward,
                step.obs.clone(),
            )?;

            let hit_limit = self.max_steps_per_episode.map_or(false, |m| steps >= m);
            if step.is_done() || hit_limit {
                let transitions = window.drain(step.is_terminated)?;
                stat.transitions += transitions.len();
                for tr in transitions {
                    buffer.push(tr);
                }
                return Ok(Some(EpisodeMessage {
                    actor_id: self.id,
                    episode: stat.episodes,
                    total_reward,
                    steps,
                    terminated: step.is_terminated,
                }));
            }

            if window.is_full() {
                buffer.push(window.emit_oldest(false)?);
                stat.transitions += 1;
            }
            obs = step.obs;

            if let Some(wait) = self.wait_on_action {
                std::thread::sleep(wait);
            }
        }
    }
}

/// Takes a uniformly random action with probability `eps`, otherwise samples
/// from `policy`. Falls back to uniform sampling without a usable policy.
fn sample_action(
    policy: Option<&[f32]>,
    n_actions: usize,
    eps: f32,
    rng: &mut impl Rng,
) -> Result<usize> {
    if n_actions == 0 {
        bail!("environment has no actions");
    }
    if eps > 0.0 && rng.gen::<f32>() < eps {
        return Ok(rng.gen_range(0..n_actions));
    }
    match policy {
        Some(p) if p.len() != n_actions => Err(RelayError::InvalidArgument(format!(
            "policy has {} entries for {} actions",
            p.len(),
            n_actions
        ))
        .into()),
        Some(p) => match WeightedIndex::new(p) {
            Ok(dist) => Ok(dist.sample(rng)),
            Err(e) => {
                trace!("Policy is not a distribution ({}), sampling uniformly", e);
                Ok(rng.gen_range(0..n_actions))
            }
        },
        None => Ok(rng.gen_range(0..n_actions)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_action() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(sample_action(Some(&[0.0, 1.0, 0.0][..]), 3, 0.0, &mut rng).unwrap(), 1);
            assert!(sample_action(None, 3, 0.0, &mut rng).unwrap() < 3);
            assert!(sample_action(Some(&[0.0, 0.0][..]), 2, 0.0, &mut rng).unwrap() < 2);
        }
        assert!(sample_action(Some(&[1.0][..]), 2, 0.0, &mut rng).is_err());
        assert!(sample_action(None, 0, 0.0, &mut rng).is_err());

        // With eps = 1 the policy is ignored.
        let n_zero = (0..1000)
            .filter(|_| sample_action(Some(&[0.0, 1.0][..]), 2, 1.0, &mut rng).unwrap() == 0)
            .count();
        assert!(n_zero > 400 && n_zero < 600);
    }
}
