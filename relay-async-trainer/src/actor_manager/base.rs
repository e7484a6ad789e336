use crate::{Actor, ActorManagerConfig, ActorStat, EpisodeMessage};
use anyhow::Result;
use crossbeam_channel::Sender;
use log::{error, info};
use relay_core::{Brain, Env, SharedBuffer};
use std::{
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::Duration,
};

/// Manages [`Actor`]s.
///
/// Every actor runs on its own thread with its own environment, sharing the
/// brain and the buffer with the other actors and the
/// [`AsyncTrainer`](crate::AsyncTrainer).
pub struct ActorManager<E, B>
where
    E: Env,
    B: Brain<E::Obs>,
{
    config: ActorManagerConfig,

    /// Configuration of [`Env`].
    env_config: E::Config,

    brain: Arc<B>,
    buffer: Arc<SharedBuffer<E::Obs, B::State>>,

    /// Thread handles.
    threads: Vec<JoinHandle<()>>,

    /// Flag to stop training
    stop: Arc<Mutex<bool>>,

    /// Sender of [EpisodeMessage]s, handed to the actors on [`ActorManager::run`].
    episode_sender: Option<Sender<EpisodeMessage>>,

    /// Stats of [Actor]s, shared with actor threads.
    actor_stats: Vec<Arc<Mutex<Option<ActorStat>>>>,
}

impl<E, B> ActorManager<E, B>
where
    E: Env + 'static,
    E::Config: Send + 'static,
    E::Obs: Send + 'static,
    B: Brain<E::Obs> + Send + Sync + 'static,
    B::State: Send + 'static,
{
    /// Builds a [`ActorManager`].
    pub fn build(
        config: &ActorManagerConfig,
        env_config: &E::Config,
        brain: Arc<B>,
        buffer: Arc<SharedBuffer<E::Obs, B::State>>,
        episode_sender: Sender<EpisodeMessage>,
        stop: Arc<Mutex<bool>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            env_config: env_config.clone(),
            brain,
            buffer,
            threads: vec![],
            stop,
            episode_sender: Some(episode_sender),
            actor_stats: vec![],
        })
    }

    /// Spawns a thread for each [`Actor`].
    ///
    /// The episode sender is moved into the actors, so the episode channel
    /// disconnects once every actor has exited.
    pub fn run(&mut self, guard_init_env: Arc<Mutex<bool>>) -> Result<()> {
        let sender = match self.episode_sender.take() {
            Some(sender) => sender,
            None => anyhow::bail!("actors are already running"),
        };
        let wait_on_action = match self.config.wait_on_action_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        for id in 0..self.config.n_actors {
            let stat = Arc::new(Mutex::new(None));
            self.actor_stats.push(stat.clone());

            let mut actor = Actor::<E, B>::build(
                id,
                self.env_config.clone(),
                self.config.window_config.clone(),
                self.config.exploration_config.clone(),
                self.config.max_steps_per_episode,
                wait_on_action,
                self.config.max_episode_failures,
                self.stop.clone(),
                self.config.seed + id as i64,
                stat,
            );
            let brain = self.brain.clone();
            let buffer = self.buffer.clone();
            let sender = sender.clone();
            let guard = guard_init_env.clone();

            let handle = std::thread::Builder::new()
                .name(format!("actor-{}", id))
                .spawn(move || {
                    if let Err(e) = actor.run(brain, buffer, sender, guard) {
                        error!("Actor {} exited with an error: {}", id, e);
                    }
                })?;
            self.threads.push(handle);
        }
        info!("Started {} actor threads", self.config.n_actors);

        Ok(())
    }

    /// Waits until all actors finish.
    pub fn join(self) -> Vec<ActorStat> {
        for h in self.threads {
            if h.join().is_err() {
                error!("An actor thread panicked");
            }
        }

        self.actor_stats
            .iter()
            .map(|e| e.lock().unwrap().clone().unwrap_or_default())
            .collect::<Vec<_>>()
    }

    /// Stops actor threads.
    pub fn stop(&self) {
        let mut stop = self.stop.lock().unwrap();
        *stop = true;
    }

    /// Stops and joins actors.
    pub fn stop_and_join(self) -> Vec<ActorStat> {
        self.stop();
        self.join()
    }
}
