use std::time::Duration;

/// Stats of sampling process in each [Actor](crate::Actor).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorStat {
    /// The number of steps for interaction between brain and env.
    pub env_steps: usize,

    /// The number of finished episodes.
    pub episodes: usize,

    /// The number of episodes aborted by an error.
    pub failed_episodes: usize,

    /// The number of transitions pushed to the shared buffer.
    pub transitions: usize,

    /// Duration of sampling loop in [Actor](crate::Actor).
    pub duration: Duration,
}

/// Returns a formatted string of the set of [ActorStat] for reporting.
pub fn actor_stats_fmt(stats: &[ActorStat]) -> String {
    let mut s =
        "actor id, env steps, episodes, failed, transitions, duration [sec], steps per sec\n"
            .to_string();
    for (i, stat) in stats.iter().enumerate() {
        let n = stat.env_steps;
        let d = stat.duration.as_secs_f32();
        let p = if d > 0.0 { (n as f32) / d } else { 0.0 };
        s += format!(
            "{}, {}, {}, {}, {}, {}, {}\n",
            i, n, stat.episodes, stat.failed_episodes, stat.transitions, d, p
        )
        .as_str();
    }
    s
}
