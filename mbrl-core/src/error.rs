//! Errors in the library.
use thiserror::Error;

/// Errors raised by the training harness.
///
/// None of these errors are retried: the orchestrator propagates them and the run ends.
#[derive(Error, Debug, PartialEq)]
pub enum MbrlError {
    /// An algorithm or hyperparameter combination that cannot run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Sampling from a pool that holds no transitions.
    #[error("Cannot sample {requested} transitions from the empty {pool} pool")]
    EmptyPool {
        /// Name of the pool, e.g. `real` or `model`.
        pool: String,

        /// Number of transitions requested.
        requested: usize,
    },

    /// Vector lengths that do not match the declared dimensions.
    #[error("Shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The offending field.
        what: String,

        /// The declared dimension.
        expected: usize,

        /// The given dimension.
        actual: usize,
    },

    /// A malformed offline dataset.
    #[error("Dataset error: {0}")]
    Dataset(String),
}

/// Errors on accessing values of a [`Record`](crate::record::Record).
#[derive(Error, Debug)]
pub enum RecordError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
