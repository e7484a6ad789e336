//! Optimizer threads training the shared brain.
mod base;
mod config;
mod stat;
pub use base::AsyncTrainer;
pub use config::AsyncTrainerConfig;
pub use stat::AsyncTrainStat;
