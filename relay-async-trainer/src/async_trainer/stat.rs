use std::time::Duration;

/// Stats of [`AsyncTrainer`](crate::AsyncTrainer)`::train()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AsyncTrainStat {
    /// The number of optimization steps.
    pub opt_steps: usize,

    /// The number of episodes reported by actors.
    pub episodes: usize,

    /// The number of transitions trained on per second.
    pub samples_per_sec: f32,

    /// Duration of training.
    pub duration: Duration,

    /// The number of optimization steps per second.
    pub opt_per_sec: f32,
}

impl AsyncTrainStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let mut s = "opt_steps, episodes, samples/sec, opt_steps/sec, duration\n".to_string();
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.opt_steps,
            self.episodes,
            self.samples_per_sec,
            self.opt_per_sec,
            self.duration.as_secs_f32()
        )
        .as_str();
        s
    }
}
