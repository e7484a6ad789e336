//! Messages sent from actors to the trainer.

/// Summary of an episode finished by an [`Actor`](crate::Actor).
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeMessage {
    /// Id of the actor.
    pub actor_id: usize,

    /// Episode count of the actor, starting at 0.
    pub episode: usize,

    /// Sum of the unscaled rewards.
    pub total_reward: f32,

    /// Number of environment steps.
    pub steps: usize,

    /// The episode ended in a terminal state rather than being cut off.
    pub terminated: bool,
}
