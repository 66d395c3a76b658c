//! Configuration of the dynamics ensemble.
use super::TerminationFn;
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ProbEnsemble`](super::ProbEnsemble).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ProbEnsembleConfig {
    /// The number of members.
    pub n_members: usize,

    /// Hidden units of each member.
    pub units: Vec<usize>,

    /// Optimizer shared by the members.
    pub opt_config: OptimizerConfig,

    /// Gradient steps in [`fit`](mbrl_core::DynamicsModel::fit).
    pub n_fit_steps: usize,

    /// Size of the bootstrap minibatch of each member.
    pub batch_size: usize,

    /// Weight of the uncertainty penalty subtracted from predicted rewards.
    pub penalty: f32,

    /// Soft lower bound of predicted log variances.
    pub min_logvar: f64,

    /// Soft upper bound of predicted log variances.
    pub max_logvar: f64,

    /// Seed of member selection and sampling in predictions.
    pub seed: u64,

    /// Termination criterion of predicted states.
    pub termination: TerminationFn,

    /// Device of the members.
    pub device: Option<Device>,
}

impl Default for ProbEnsembleConfig {
    fn default() -> Self {
        Self {
            n_members: 7,
            units: vec![200, 200, 200, 200],
            opt_config: OptimizerConfig::Adam { lr: 1e-3 },
            n_fit_steps: 1000,
            batch_size: 256,
            penalty: 1.0,
            min_logvar: -10.0,
            max_logvar: 0.5,
            seed: 0,
            termination: TerminationFn::Never,
            device: None,
        }
    }
}

impl ProbEnsembleConfig {
    /// Sets the number of members.
    pub fn n_members(mut self, v: usize) -> Self {
        self.n_members = v;
        self
    }

    /// Sets the hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Sets the optimizer.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the number of gradient steps per fit.
    pub fn n_fit_steps(mut self, v: usize) -> Self {
        self.n_fit_steps = v;
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the reward penalty.
    pub fn penalty(mut self, v: f32) -> Self {
        self.penalty = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the termination criterion.
    pub fn termination(mut self, v: TerminationFn) -> Self {
        self.termination = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Constructs [`ProbEnsembleConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ProbEnsembleConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_ensemble_config() -> Result<()> {
        let config = ProbEnsembleConfig::default()
            .n_members(3)
            .termination(TerminationFn::OutOfBounds { bound: 10.0 });
        let dir = TempDir::new("ensemble_config")?;
        let path = dir.path().join("ensemble.yaml");
        config.save(&path)?;
        assert_eq!(config, ProbEnsembleConfig::load(&path)?);
        Ok(())
    }
}
