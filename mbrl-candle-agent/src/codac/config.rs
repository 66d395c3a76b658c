//! Configuration of CODAC agent.
use crate::{
    sac::SacConfig,
    util::{OutDim, RiskType},
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Conservative penalty on the return distribution.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum DistPenalty {
    /// Push down quantile means of uniform and policy actions.
    #[default]
    #[serde(rename = "uniform")]
    Uniform,

    /// No penalty.
    #[serde(rename = "none")]
    Disabled,
}

impl DistPenalty {
    /// Name used in run names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Disabled => "none",
        }
    }
}

/// Configuration of [`Codac`](super::Codac).
///
/// The output dimension of the critic networks is set to `n_quantiles` when
/// the agent is built.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CodacConfig<Q, P: OutDim> {
    /// Configuration of the actor, the critics and the entropy coefficient.
    pub sac: SacConfig<Q, P>,

    /// The number of quantiles of the return distribution.
    pub n_quantiles: usize,

    /// Threshold of the quantile Huber loss.
    pub kappa: f64,

    /// Risk measure maximized by the actor.
    pub risk: RiskType,

    /// Conservative penalty.
    pub dist_penalty: DistPenalty,

    /// Weight of the conservative penalty.
    pub min_z_weight: f64,

    /// Actions sampled per state for the penalty.
    pub n_action_samples: usize,

    /// Threshold of the penalty tuned with a Lagrange multiplier.
    pub lagrange_thresh: Option<f64>,

    /// Learning rate of the Lagrange multiplier.
    pub lagrange_lr: f64,
}

impl<Q, P: OutDim> Default for CodacConfig<Q, P> {
    fn default() -> Self {
        Self {
            sac: SacConfig::default(),
            n_quantiles: 32,
            kappa: 1.0,
            risk: RiskType::Neutral,
            dist_penalty: DistPenalty::Uniform,
            min_z_weight: 10.0,
            n_action_samples: 10,
            lagrange_thresh: None,
            lagrange_lr: 3e-4,
        }
    }
}

impl<Q, P> CodacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + OutDim,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor and the critics.
    pub fn sac(mut self, v: SacConfig<Q, P>) -> Self {
        self.sac = v;
        self
    }

    /// Sets the number of quantiles.
    pub fn n_quantiles(mut self, v: usize) -> Self {
        self.n_quantiles = v;
        self
    }

    /// Sets the risk measure.
    pub fn risk(mut self, v: RiskType) -> Self {
        self.risk = v;
        self
    }

    /// Sets the conservative penalty.
    pub fn dist_penalty(mut self, v: DistPenalty) -> Self {
        self.dist_penalty = v;
        self
    }

    /// Sets the weight of the conservative penalty.
    pub fn min_z_weight(mut self, v: f64) -> Self {
        self.min_z_weight = v;
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

    /// Constructs [`CodacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CodacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::MlpConfig;
    use tempdir::TempDir;

    #[test]
    fn test_serde_codac_config() -> Result<()> {
        let config = CodacConfig::<MlpConfig, MlpConfig>::default()
            .risk(RiskType::Wang(0.75))
            .dist_penalty(DistPenalty::Disabled)
            .lagrange_thresh(Some(10.0));
        let dir = TempDir::new("codac_config")?;
        let path = dir.path().join("codac.yaml");
        config.save(&path)?;
        assert_eq!(config, CodacConfig::load(&path)?);
        Ok(())
    }
}
