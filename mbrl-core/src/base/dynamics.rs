//! Learned dynamics.
use crate::{record::Record, TransitionPool};
use anyhow::Result;
use ndarray::Array2;
use std::path::Path;

/// Output of [`DynamicsPredictor::predict`] for a batch of `n` queries.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predicted next states, `[n, obs_dim]`.
    pub next_obs: Array2<f32>,

    /// Predicted rewards.
    pub reward: Vec<f32>,

    /// Termination flags given by the predictor's own termination criterion.
    pub is_done: Vec<bool>,
}

/// Predicts `(next_state, reward, done)` from `(state, action)`.
///
/// Implementations backed by an ensemble pick one member at random for every
/// row of the query instead of averaging members, so the batch keeps the
/// disagreement between members.
pub trait DynamicsPredictor {
    /// Predicts a batch, `obs: [n, obs_dim]`, `act: [n, act_dim]`.
    fn predict(&mut self, obs: &Array2<f32>, act: &Array2<f32>) -> Result<Prediction>;
}

/// A [`DynamicsPredictor`] that can be fitted to real transitions and checkpointed.
pub trait DynamicsModel: DynamicsPredictor {
    /// Fits the model to the transitions in `pool`.
    fn fit(&mut self, pool: &mut TransitionPool) -> Result<Record>;

    /// Saves the parameters in the given directory.
    fn save_params(&self, path: &Path) -> Result<()>;

    /// Loads the parameters from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
