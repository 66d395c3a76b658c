//! Evaluate [`Agent`].
use crate::Agent;
use anyhow::Result;
mod default_evaluator;
mod stats;
pub use default_evaluator::{DefaultEvaluator, DefaultEvaluatorConfig};
pub use stats::{cvar, mean, std, EvalRecord, ScoreNormalizer, CVAR_ALPHA};

/// Evaluate [`Agent`].
pub trait Evaluator {
    /// Runs the policy of `agent` and returns statistics of the episode rewards.
    ///
    /// The caller of this method needs to handle the internal state of `agent`,
    /// like training/evaluation mode. Evaluation never writes to a transition pool.
    fn evaluate(&mut self, agent: &mut dyn Agent) -> Result<EvalRecord>;
}
