//! Configuration of [`TransitionPool`](super::TransitionPool).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`TransitionPool`](super::TransitionPool).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TransitionPoolConfig {
    /// Name used in logs and errors, e.g. `real` or `model`.
    pub name: String,

    /// The maximum number of transitions held by the pool.
    pub capacity: usize,

    /// Dimension of state vectors.
    pub obs_dim: usize,

    /// Dimension of action vectors.
    pub act_dim: usize,

    /// Seed of the random number generator used for sampling.
    pub seed: u64,
}

impl Default for TransitionPoolConfig {
    fn default() -> Self {
        Self {
            name: "real".to_string(),
            capacity: 10000,
            obs_dim: 1,
            act_dim: 1,
            seed: 42,
        }
    }
}

impl TransitionPoolConfig {
    /// Sets the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the dimensions of states and actions.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self.act_dim = act_dim;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
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
