//! Transition pipeline from producer windows into the shared buffer.
mod base;
mod batch;
mod config;
mod iw_scheduler;
mod sum_tree;
mod window;
pub use base::SharedBuffer;
pub use batch::{one_hot, Transition, TransitionBatch};
pub use config::{PerConfig, PriorityInit, SharedBufferConfig, WeightNormalizer, WindowConfig};
pub use iw_scheduler::IwScheduler;
pub use sum_tree::{is_power_of_two, SumTree};
pub use window::{TrajectoryWindow, WindowState};
