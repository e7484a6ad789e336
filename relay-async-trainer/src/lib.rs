//! Asynchronous training with shared n-step experience.
//!
//! [`Actor`]s step their own environments on separate threads, fold the steps
//! into n-step transitions and push them into a shared buffer.
//! [`AsyncTrainer`] runs optimizer threads that take batches from the buffer,
//! either in arrival order or by priority, and train the brain shared with
//! the actors. [`train_async`] wires both sides together.
mod actor;
mod actor_manager;
mod async_trainer;
mod messages;
mod util;
pub use actor::{actor_stats_fmt, Actor, ActorStat, ExplorationConfig};
pub use actor_manager::{ActorManager, ActorManagerConfig};
pub use async_trainer::{AsyncTrainStat, AsyncTrainer, AsyncTrainerConfig};
pub use messages::EpisodeMessage;
pub use util::train_async;

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use crossbeam_channel::unbounded;
    use relay_core::{
        dummy::{ConstantBrain, CorridorConfig, CorridorEnv},
        error::RelayError,
        record::{BufferedRecorder, NullRecorder},
        ExperienceBufferBase, PerConfig, ReplayBufferBase, SamplingConfig, SharedBuffer,
        SharedBufferConfig, WindowConfig,
    };
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };
    use test_log::test;

    fn actor_man_config(n_actors: usize) -> ActorManagerConfig {
        ActorManagerConfig::new(n_actors)
            .window_config(WindowConfig::default().n_steps(3))
            .exploration_config(ExplorationConfig::disabled())
    }

    fn async_trainer_config(sampling_config: SamplingConfig) -> AsyncTrainerConfig {
        AsyncTrainerConfig::default()
            .n_optimizers(2)
            .max_opts(50)
            .warmup_period(10)
            .sync_interval(10)
            .record_interval(10)
            .sampling_config(sampling_config)
    }

    #[test]
    fn test_train_async_fifo() -> Result<()> {
        let brain = Arc::new(ConstantBrain::new(2, 0.0));
        let mut recorder = BufferedRecorder::new();

        let (stat, actor_stats) = train_async::<CorridorEnv, _, _>(
            &CorridorConfig::default(),
            brain.clone(),
            &SharedBufferConfig::default(),
            &actor_man_config(2),
            &async_trainer_config(SamplingConfig::Fifo { batch_size: 8 }),
            &mut recorder,
        )?;

        assert_eq!(stat.opt_steps, 50);
        assert_eq!(brain.n_train(), 50);
        assert_eq!(brain.n_sync(), 5);
        assert_eq!(actor_stats.len(), 2);
        assert!(actor_stats.iter().all(|s| s.env_steps > 0));

        // One flush every 10 optimization steps. Records of concurrent
        // optimizers may arrive out of order.
        assert_eq!(recorder.len(), 5);
        let mut flushed = recorder
            .iter()
            .map(|r| r.get_scalar("opt_steps").unwrap() as usize)
            .collect::<Vec<_>>();
        flushed.sort_unstable();
        assert_eq!(flushed, vec![10, 20, 30, 40, 50]);
        assert!(recorder.iter().all(|r| r.get_scalar("opt_per_sec").is_ok()));
        Ok(())
    }

    #[test]
    fn test_train_async_prioritized() -> Result<()> {
        let brain = Arc::new(ConstantBrain::new(2, 0.5));
        let buffer_config = SharedBufferConfig::default()
            .capacity(64)
            .per_config(Some(PerConfig::default()));
        let trainer_config = async_trainer_config(SamplingConfig::Prioritized { batch_size: 16 })
            .max_opts(30)
            .warmup_period(32);

        let (stat, _) = train_async::<CorridorEnv, _, _>(
            &CorridorConfig::default(),
            brain.clone(),
            &buffer_config,
            &actor_man_config(2),
            &trainer_config,
            &mut NullRecorder::new(),
        )?;

        assert_eq!(stat.opt_steps, 30);
        assert_eq!(brain.n_train(), 30);
        assert_eq!(brain.n_samples(), 30 * 16);
        Ok(())
    }

    #[test]
    fn test_prioritized_sampling_needs_per_buffer() {
        let brain = Arc::new(ConstantBrain::new(2, 0.0));
        let result = train_async::<CorridorEnv, _, _>(
            &CorridorConfig::default(),
            brain.clone(),
            &SharedBufferConfig::default(),
            &actor_man_config(1),
            &async_trainer_config(SamplingConfig::Prioritized { batch_size: 8 }),
            &mut NullRecorder::new(),
        );

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RelayError>(),
            Some(RelayError::InvalidArgument(_))
        ));
        assert_eq!(brain.n_train(), 0);
    }

    #[test]
    fn test_failing_actors_stop_training() -> Result<()> {
        let env_config = CorridorConfig {
            fail_at_step: Some(0),
            ..Default::default()
        };
        let brain = Arc::new(ConstantBrain::new(2, 0.0));
        let actor_config = actor_man_config(2).max_episode_failures(3);
        let trainer_config =
            async_trainer_config(SamplingConfig::Fifo { batch_size: 8 }).warmup_period(0);

        let (stat, actor_stats) = train_async::<CorridorEnv, _, _>(
            &env_config,
            brain.clone(),
            &SharedBufferConfig::default(),
            &actor_config,
            &trainer_config,
            &mut NullRecorder::new(),
        )?;

        assert_eq!(stat.opt_steps, 0);
        assert_eq!(brain.n_train(), 0);
        for s in actor_stats.iter() {
            assert_eq!(s.failed_episodes, 3);
            assert_eq!(s.transitions, 0);
        }
        Ok(())
    }

    #[test]
    fn test_actor_manager_stop_and_join() -> Result<()> {
        let brain = Arc::new(ConstantBrain::new(2, 0.0));
        let buffer = Arc::new(SharedBuffer::build(&SharedBufferConfig::default())?);
        let stop = Arc::new(Mutex::new(false));
        let (sender, receiver) = unbounded();
        let config = actor_man_config(3)
            .max_steps_per_episode(Some(10))
            .wait_on_action_ms(1);

        let mut actors = ActorManager::<CorridorEnv, _>::build(
            &config,
            &CorridorConfig::default(),
            brain,
            buffer.clone(),
            sender,
            stop.clone(),
        )?;
        actors.run(Arc::new(Mutex::new(true)))?;
        assert!(actors.run(Arc::new(Mutex::new(true))).is_err());
        std::thread::sleep(Duration::from_millis(200));
        let stats = actors.stop_and_join();
        assert!(*stop.lock().unwrap());

        assert_eq!(stats.len(), 3);
        let transitions = stats.iter().map(|s| s.transitions).sum::<usize>();
        let episodes = stats.iter().map(|s| s.episodes).sum::<usize>();
        assert!(transitions > 0);
        assert_eq!(buffer.len(), transitions);
        for s in stats.iter() {
            assert!(s.transitions <= s.env_steps);
            assert_eq!(s.failed_episodes, 0);
        }

        // Every finished episode was reported, and the channel is closed.
        let messages = receiver.iter().collect::<Vec<_>>();
        assert_eq!(messages.len(), episodes);
        assert!(messages.iter().all(|m| m.steps <= 10 && m.actor_id < 3));
        Ok(())
    }
}
