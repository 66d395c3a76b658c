//! Agent.
use crate::{record::Record, MixedBatch};
use anyhow::Result;
use ndarray::Array2;
use std::path::Path;

/// An actor-critic learner driven by the [`Trainer`](crate::Trainer).
///
/// All variants (model-free, conservative and distributional conservative
/// critics) present this surface. Variant-specific hyperparameters belong to
/// their configurations and are fixed when the agent is built.
pub trait Agent {
    /// Sets the agent to training mode, where actions are sampled stochastically.
    fn train(&mut self);

    /// Sets the agent to evaluation mode, where actions are deterministic.
    fn eval(&mut self);

    /// Returns `true` in training mode.
    fn is_train(&self) -> bool;

    /// Returns actions for a batch of states, `[n, obs_dim] -> [n, act_dim]`.
    fn select_action(&mut self, obs: &Array2<f32>) -> Result<Array2<f32>>;

    /// Performs an optimization step on a minibatch of real and model transitions.
    fn update(&mut self, batch: MixedBatch) -> Result<Record>;

    /// Saves the parameters of the agent in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
