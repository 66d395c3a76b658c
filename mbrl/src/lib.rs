//! Model-based offline reinforcement learning.
//!
//! This crate gathers the components of the harness:
//!
//! * [`mbrl_core`] provides the transition pools, the rollout generator, the
//!   trainer and the evaluator.
//! * [`mbrl_candle_agent`] provides SAC, CQL and CODAC agents and the
//!   probabilistic dynamics ensemble.
//! * [`mbrl_tensorboard`] writes training records to TensorBoard.
//!
//! It also contains reference environments, the reference scores of D4RL
//! domains and the naming of training runs. The `train_offline` binary trains
//! an agent with any of these.
pub mod env;
pub mod ref_scores;
pub mod run_name;
pub use mbrl_candle_agent;
pub use mbrl_core;
pub use mbrl_tensorboard;
