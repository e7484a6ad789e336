use crate::ExplorationConfig;
use anyhow::Result;
use relay_core::{error::RelayError, WindowConfig};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [ActorManager](super::ActorManager).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActorManagerConfig {
    /// Number of actor threads.
    pub n_actors: usize,

    /// Episodes are cut off after this many steps, in addition to the
    /// environment's own truncation.
    pub max_steps_per_episode: Option<usize>,

    /// Sleep after every environment step, in milliseconds. 0 disables pacing.
    pub wait_on_action_ms: u64,

    /// An actor gives up after this many failed episodes in a row. 0 means it
    /// never gives up.
    pub max_episode_failures: usize,

    /// Seed of the environment of actor 0. Actor `i` uses `seed + i`.
    pub seed: i64,

    /// Configuration of the trajectory window of each actor.
    pub window_config: WindowConfig,

    /// Exploration schedule of each actor.
    pub exploration_config: ExplorationConfig,
}

impl Default for ActorManagerConfig {
    fn default() -> Self {
        Self {
            n_actors: 1,
            max_steps_per_episode: None,
            wait_on_action_ms: 0,
            max_episode_failures: 10,
            seed: 42,
            window_config: WindowConfig::default(),
            exploration_config: ExplorationConfig::default(),
        }
    }
}

impl ActorManagerConfig {
    /// Creates a configuration with `n_actors` actors.
    pub fn new(n_actors: usize) -> Self {
        Self {
            n_actors,
            ..Default::default()
        }
    }

    /// Sets the step limit of episodes.
    pub fn max_steps_per_episode(mut self, v: Option<usize>) -> Self {
        self.max_steps_per_episode = v;
        self
    }

    /// Sets the sleep after every environment step.
    pub fn wait_on_action_ms(mut self, v: u64) -> Self {
        self.wait_on_action_ms = v;
        self
    }

    /// Sets the number of failed episodes in a row an actor tolerates.
    pub fn max_episode_failures(mut self, v: usize) -> Self {
        self.max_episode_failures = v;
        self
    }

    /// Sets the seed of the first actor.
    pub fn seed(mut self, v: i64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the trajectory window configuration.
    pub fn window_config(mut self, v: WindowConfig) -> Self {
        self.window_config = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn exploration_config(mut self, v: ExplorationConfig) -> Self {
        self.exploration_config = v;
        self
    }

    /// Checks the number of actors and the nested configurations.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.n_actors == 0 {
            return Err(RelayError::invalid("n_actors must be at least 1"));
        }
        if self.max_steps_per_episode == Some(0) {
            return Err(RelayError::invalid("max_steps_per_episode must be at least 1"));
        }
        self.window_config.validate()?;
        self.exploration_config.validate()
    }

    /// Constructs [ActorManagerConfig] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [ActorManagerConfig].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_validate() {
        assert!(ActorManagerConfig::default().validate().is_ok());
        assert!(ActorManagerConfig::new(0).validate().is_err());
        assert!(ActorManagerConfig::new(2)
            .max_steps_per_episode(Some(0))
            .validate()
            .is_err());
        assert!(ActorManagerConfig::new(2)
            .window_config(WindowConfig::default().n_steps(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("relay_actor_manager")?;
        let path = dir.path().join("actor_manager.yaml");
        let config = ActorManagerConfig::new(4)
            .max_steps_per_episode(Some(200))
            .seed(7)
            .exploration_config(ExplorationConfig::disabled());
        config.save(&path)?;
        assert_eq!(ActorManagerConfig::load(&path)?, config);
        Ok(())
    }
}
