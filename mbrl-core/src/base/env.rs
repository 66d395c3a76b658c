//! Environment.
use super::BoxSpace;
use crate::record::Record;
use anyhow::Result;

/// Outcome of an environment step.
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the step.
    pub obs: Vec<f32>,

    /// Reward of the step.
    pub reward: f32,

    /// `true` if the episode terminated at this step.
    pub is_terminated: bool,

    /// Additional information defined by the environment.
    pub info: Record,
}

impl Step {
    /// Constructs a [`Step`] without additional information.
    pub fn new(obs: Vec<f32>, reward: f32, is_terminated: bool) -> Self {
        Self {
            obs,
            reward,
            is_terminated,
            info: Record::empty(),
        }
    }
}

/// A stepping environment with continuous states and actions.
///
/// Used by the [`EnvSampler`](crate::EnvSampler) for exploration and by the
/// [`DefaultEvaluator`](crate::DefaultEvaluator). Failures are returned as they are;
/// the trainer does not retry them.
pub trait Env {
    /// Configuration.
    type Config: Clone;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Starts a new episode and returns its initial observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Applies an action.
    fn step(&mut self, act: &[f32]) -> Result<Step>;

    /// The observation space.
    fn observation_space(&self) -> &BoxSpace;

    /// The action space.
    fn action_space(&self) -> &BoxSpace;

    /// Reseeds the random number generator of the environment.
    fn seed(&mut self, seed: u64);
}
