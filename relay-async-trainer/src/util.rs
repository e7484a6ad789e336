//! Utility function.
use crate::{
    actor_stats_fmt, ActorManager, ActorManagerConfig, ActorStat, AsyncTrainStat, AsyncTrainer,
    AsyncTrainerConfig,
};
use anyhow::Result;
use crossbeam_channel::unbounded;
use log::info;
use relay_core::{
    record::Recorder, Brain, Env, ReplayBufferBase, SharedBuffer, SharedBufferConfig,
};
use std::sync::{Arc, Mutex};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs asynchronous training.
///
/// This function runs [`ActorManager`] and [`AsyncTrainer`] on threads sharing
/// `brain` and a [`SharedBuffer`] built from `buffer_config`. Actors report
/// finished episodes through a [`crossbeam_channel`], and optimizer records are
/// written to `recorder`.
///
/// ```mermaid
/// flowchart LR
///   subgraph Actors
///     A1[Actor 0] --> W1[TrajectoryWindow]
///     A2[Actor n] --> W2[TrajectoryWindow]
///   end
///   W1 -- push --> B[(SharedBuffer)]
///   W2 -- push --> B
///   B -- drain --> O1[Optimizer 0]
///   B -- drain --> O2[Optimizer m]
///   O1 -- priorities --> B
///   O2 -- priorities --> B
///   O1 -- train --> N[Brain]
///   O2 -- train --> N
///   N -- predict --> A1
///   N -- predict --> A2
///   A1 -. EpisodeMessage .-> T[AsyncTrainer]
///   O1 -. Record .-> T
/// ```
///
/// Actors are stopped and joined after the optimizers exit, also when
/// training fails.
///
/// * `env_config` - Configuration of the environment each actor builds.
/// * `brain` - The brain predicting actions and being trained.
/// * `buffer_config` - Configuration of the shared buffer.
/// * `actor_man_config` - Configuration of [`ActorManager`].
/// * `async_trainer_config` - Configuration of [`AsyncTrainer`].
/// * `recorder` - Destination of training records.
pub fn train_async<E, B, R>(
    env_config: &E::Config,
    brain: Arc<B>,
    buffer_config: &SharedBufferConfig,
    actor_man_config: &ActorManagerConfig,
    async_trainer_config: &AsyncTrainerConfig,
    recorder: &mut R,
) -> Result<(AsyncTrainStat, Vec<ActorStat>)>
where
    E: Env + 'static,
    E::Config: Send + 'static,
    E::Obs: Send + 'static,
    B: Brain<E::Obs> + Send + Sync + 'static,
    B::State: Send + 'static,
    R: Recorder,
{
    let buffer = Arc::new(SharedBuffer::<E::Obs, B::State>::build(buffer_config)?);

    // Shared flag to stop actor and optimizer threads
    let stop = Arc::new(Mutex::new(false));

    // Finished episodes reported by actors
    let (episode_s, episode_r) = unbounded();

    // guard for initialization of envs in multiple threads
    let guard_init_env = Arc::new(Mutex::new(true));

    let mut actors = ActorManager::<E, B>::build(
        actor_man_config,
        env_config,
        brain.clone(),
        buffer.clone(),
        episode_s,
        stop.clone(),
    )?;
    let trainer = AsyncTrainer::build(async_trainer_config, stop)?;

    // Starts sampling and training
    if let Err(e) = actors.run(guard_init_env) {
        actors.stop_and_join();
        return Err(e);
    }
    let result = trainer.train(&*brain, &*buffer, episode_r, recorder);

    let actor_stats = actors.stop_and_join();
    info!("Stats of generated samples in actors");
    info!("{}", actor_stats_fmt(&actor_stats));

    let stat = result?;
    info!("Stats of async trainer");
    info!("{}", stat.fmt());

    Ok((stat, actor_stats))
}
