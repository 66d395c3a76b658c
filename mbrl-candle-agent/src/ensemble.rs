//! Probabilistic ensemble of dynamics models.
mod base;
mod config;
mod termination;
pub use base::ProbEnsemble;
pub use config::ProbEnsembleConfig;
pub use termination::TerminationFn;
