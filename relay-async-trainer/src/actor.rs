//! Takes samples from the environment and pushes them to the shared buffer.
mod base;
mod exploration;
mod stat;
pub use base::Actor;
pub use exploration::ExplorationConfig;
pub use stat::{actor_stats_fmt, ActorStat};
