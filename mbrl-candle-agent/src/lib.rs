//! Agents and dynamics ensembles implemented with [candle](https://crates.io/crates/candle-core).
//!
//! * [`sac::Sac`] is the model-free actor-critic.
//! * [`cql::Cql`] adds a conservative penalty to the critic of [`sac::Sac`].
//! * [`codac::Codac`] learns a distribution of returns with a quantile critic and
//!   trains the actor on a risk measure of that distribution.
//! * [`ensemble::ProbEnsemble`] is a probabilistic dynamics ensemble used for
//!   model rollouts.
//!
//! [`build_agent`] constructs the agent of an [`Algorithm`](mbrl_core::Algorithm)
//! from an [`AgentConfig`].
pub mod codac;
pub mod cql;
pub mod ensemble;
mod factory;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod sac;
mod tensor_batch;
pub mod util;
use anyhow::Result;
pub use factory::{build_agent, AgentConfig};
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq, Default)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    #[default]
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Returns the candle device.
    ///
    /// Fails if candle is built without CUDA support.
    pub fn build(&self) -> Result<candle_core::Device> {
        Ok(match self {
            Self::Cpu => candle_core::Device::Cpu,
            Self::Cuda(n) => candle_core::Device::new_cuda(*n)?,
        })
    }
}
