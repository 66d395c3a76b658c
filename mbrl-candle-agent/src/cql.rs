//! Conservative Q-learning (CQL) agent.
mod base;
mod config;
pub use base::Cql;
pub use config::CqlConfig;
