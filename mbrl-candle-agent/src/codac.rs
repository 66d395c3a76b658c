//! Conservative offline distributional actor-critic (CODAC) agent.
mod base;
mod config;
pub use base::Codac;
pub use config::{CodacConfig, DistPenalty};
