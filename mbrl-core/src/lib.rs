#![warn(missing_docs)]
//! Core of a model-based offline reinforcement learning harness.
//!
//! Transitions of an offline dataset are loaded into a [`TransitionPool`]. The
//! [`Trainer`] alternates between [`RolloutGenerator`] runs, which fill a second
//! pool with transitions synthesized by a [`DynamicsPredictor`], and updates of an
//! [`Agent`] on minibatches mixing both pools. An [`Evaluator`] periodically runs
//! the policy in a real [`Env`].
pub mod dummy;
pub mod error;
pub mod record;

mod algorithm;
pub use algorithm::{Algorithm, CriticKind};

mod base;
pub use base::{Agent, BoxSpace, DynamicsModel, DynamicsPredictor, Env, Prediction, Step};

mod dataset;
pub use dataset::Dataset;

pub use error::MbrlError;

mod evaluator;
pub use evaluator::{
    cvar, mean, std, DefaultEvaluator, DefaultEvaluatorConfig, EvalRecord, Evaluator,
    ScoreNormalizer, CVAR_ALPHA,
};

mod pool;
pub use pool::{TransitionPool, TransitionPoolConfig};

mod rollout;
pub use rollout::{RolloutConfig, RolloutGenerator};

mod sampler;
pub use sampler::{exploration_before_start, EnvSampler};

mod trainer;
pub use trainer::{Phase, PhaseError, Trainer, TrainerConfig};

mod transition;
pub use transition::{MixedBatch, Transition, TransitionBatch};
