//! Recording of training metrics.
//!
//! Optimizer threads describe each step with a [`Record`], a map from keys to
//! [`RecordValue`]s. Records are stored in a [`Recorder`] and aggregated when
//! it is flushed.
//!
//! ```rust
//! use relay_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("loss", 0.5);
//! record.insert("actor", RecordValue::String("actor-0".to_string()));
//! assert_eq!(record.get_scalar("loss").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
