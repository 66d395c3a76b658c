//! Scheduling phases reported on failures.
use std::fmt;

/// A phase of the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fitting the dynamics model before the first epoch.
    Fit,

    /// Generating model rollouts.
    Rollout,

    /// Updating the agent.
    Train,

    /// Evaluating the agent.
    Evaluate,

    /// Saving parameters.
    Checkpoint,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fit => "fit",
            Self::Rollout => "rollout",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Checkpoint => "checkpoint",
        };
        f.write_str(s)
    }
}

/// Context attached to errors raised inside the training loop.
///
/// The underlying error stays reachable with [`anyhow::Error::downcast_ref`],
/// and this context with `downcast_ref::<PhaseError>()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseError {
    /// The failing phase.
    pub phase: Phase,

    /// Epoch index.
    pub epoch: usize,

    /// Step within the epoch.
    pub step: usize,
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "training failed in the {} phase at epoch {}, step {}",
            self.phase, self.epoch, self.step
        )
    }
}
