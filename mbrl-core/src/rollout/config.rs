//! Configuration of [`RolloutGenerator`](super::RolloutGenerator).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`RolloutGenerator`](super::RolloutGenerator).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct RolloutConfig {
    /// The number of model steps of a rollout.
    pub rollout_length: usize,

    /// The number of trajectories started in a rollout.
    pub rollout_batch_size: usize,

    /// The number of epochs worth of rollouts kept in the model pool.
    pub model_retain_epochs: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            rollout_length: 1,
            rollout_batch_size: 50000,
            model_retain_epochs: 5,
        }
    }
}

impl RolloutConfig {
    /// Sets the rollout length.
    pub fn rollout_length(mut self, v: usize) -> Self {
        self.rollout_length = v;
        self
    }

    /// Sets the number of trajectories in a rollout.
    pub fn rollout_batch_size(mut self, v: usize) -> Self {
        self.rollout_batch_size = v;
        self
    }

    /// Sets the retention of the model pool in epochs.
    pub fn model_retain_epochs(mut self, v: usize) -> Self {
        self.model_retain_epochs = v;
        self
    }

    /// The maximum number of transitions a single rollout produces.
    pub fn max_transitions(&self) -> usize {
        self.rollout_length * self.rollout_batch_size
    }

    /// Capacity of the model pool.
    ///
    /// `model_retain_epochs * floor(rollout_length * rollout_batch_size * epoch_length / model_train_freq)`,
    /// i.e., the model steps of `model_retain_epochs` epochs. The steps of an
    /// epoch are fractional when `epoch_length` is not a multiple of `model_train_freq`.
    pub fn model_pool_capacity(&self, epoch_length: usize, model_train_freq: usize) -> usize {
        let steps_per_epoch = self.max_transitions() as f64 * epoch_length as f64
            / model_train_freq.max(1) as f64;
        self.model_retain_epochs * steps_per_epoch as usize
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
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
    fn test_model_pool_capacity() {
        let config = RolloutConfig::default();
        // 5 * 1 * 50000 * 1000 / 1000
        assert_eq!(config.model_pool_capacity(1000, 1000), 250000);

        let config = config.rollout_length(5).rollout_batch_size(10).model_retain_epochs(2);
        assert_eq!(config.model_pool_capacity(1000, 250), 400);
    }

    #[test]
    fn test_model_pool_capacity_fractional_rollouts() {
        let config = RolloutConfig::default();
        // Shorter epochs than the rollout interval
        assert_eq!(config.model_pool_capacity(100, 1000), 25000);
        // 5 * floor(50000 * 1000 / 300)
        assert_eq!(config.model_pool_capacity(1000, 300), 833330);
    }

    #[test]
    fn test_serde_rollout_config() -> Result<()> {
        let config = RolloutConfig::default().rollout_length(3);
        let dir = TempDir::new("rollout_config")?;
        let path = dir.path().join("rollout_config.yaml");
        config.save(&path)?;
        assert_eq!(config, RolloutConfig::load(&path)?);
        Ok(())
    }
}
