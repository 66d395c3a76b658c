//! Configuration of CQL agent.
use crate::{sac::SacConfig, util::OutDim};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Cql`](super::Cql).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CqlConfig<Q, P: OutDim> {
    /// Configuration of the underlying SAC.
    pub sac: SacConfig<Q, P>,

    /// Weight of the conservative penalty.
    pub min_q_weight: f64,

    /// Actions sampled per state from each of the uniform distribution and the
    /// policy.
    pub n_action_samples: usize,

    /// Threshold of the penalty tuned with a Lagrange multiplier. `None` keeps
    /// the weight fixed.
    pub lagrange_thresh: Option<f64>,

    /// Learning rate of the Lagrange multiplier.
    pub lagrange_lr: f64,
}

impl<Q, P: OutDim> Default for CqlConfig<Q, P> {
    fn default() -> Self {
        Self {
            sac: SacConfig::default(),
            min_q_weight: 5.0,
            n_action_samples: 10,
            lagrange_thresh: None,
            lagrange_lr: 3e-4,
        }
    }
}

impl<Q, P> CqlConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + OutDim,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the underlying SAC.
    pub fn sac(mut self, v: SacConfig<Q, P>) -> Self {
        self.sac = v;
        self
    }

    /// Sets the weight of the conservative penalty.
    pub fn min_q_weight(mut self, v: f64) -> Self {
        self.min_q_weight = v;
        self
    }

    /// Sets the number of sampled actions per state.
    pub fn n_action_samples(mut self, v: usize) -> Self {
        self.n_action_samples = v;
        self
    }

    /// Sets the threshold of the Lagrange multiplier.
    pub fn lagrange_thresh(mut self, v: Option<f64>) -> Self {
        self.lagrange_thresh = v;
        self
    }

    /// Constructs [`CqlConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CqlConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
