//! Records of training and evaluation metrics.
//!
//! A [`Record`] is a bag of named values. Agents return one from every update,
//! the [`Evaluator`](crate::Evaluator) returns one per evaluation event, and the
//! [`Trainer`](crate::Trainer) forwards them to a [`Recorder`].
//!
//! ```rust
//! use mbrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("epoch", 3.0);
//! record.insert("eval_reward", RecordValue::Scalar(-12.5));
//! assert_eq!(record.get_scalar("epoch").unwrap(), 3.0);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use storage::RecordStorage;
