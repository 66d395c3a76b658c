//! Construction of agents from algorithm tags.
use crate::{
    codac::{Codac, CodacConfig},
    cql::{Cql, CqlConfig},
    mlp::{Mlp, Mlp2, MlpConfig},
    sac::{EntCoefMode, Sac, SacConfig},
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig, OutDim},
};
use anyhow::Result;
use mbrl_core::{Agent, Algorithm, CriticKind, MbrlError};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of the agent built by [`build_agent`].
///
/// Input and output dimensions of the networks are filled in from the
/// environment when the agent is built.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum AgentConfig {
    /// Configuration of [`Sac`].
    Sac(SacConfig<MlpConfig, MlpConfig>),

    /// Configuration of [`Cql`].
    Cql(CqlConfig<MlpConfig, MlpConfig>),

    /// Configuration of [`Codac`].
    Codac(CodacConfig<MlpConfig, MlpConfig>),
}

fn default_sac_config(units: &[usize]) -> SacConfig<MlpConfig, MlpConfig> {
    SacConfig::default()
        .actor_config(
            GaussianActorConfig::default().policy_config(MlpConfig::new(0, units.to_vec(), 0, false)),
        )
        .critic_config(
            MultiCriticConfig::default().q_config(MlpConfig::new(0, units.to_vec(), 1, false)),
        )
}

impl AgentConfig {
    /// Default configuration of the agent of `algorithm` with two hidden layers
    /// of 256 units.
    pub fn default_for(algorithm: Algorithm) -> Self {
        let sac = default_sac_config(&[256, 256]);
        match algorithm.critic() {
            CriticKind::ModelFree => Self::Sac(sac),
            CriticKind::Conservative => Self::Cql(CqlConfig::default().sac(sac)),
            CriticKind::Distributional => Self::Codac(CodacConfig::default().sac(sac)),
        }
    }

    /// The kind of critic of the configured agent.
    pub fn critic_kind(&self) -> CriticKind {
        match self {
            Self::Sac(_) => CriticKind::ModelFree,
            Self::Cql(_) => CriticKind::Conservative,
            Self::Codac(_) => CriticKind::Distributional,
        }
    }

    /// The SAC part of the configuration.
    pub fn sac_config_mut(&mut self) -> &mut SacConfig<MlpConfig, MlpConfig> {
        match self {
            Self::Sac(config) => config,
            Self::Cql(config) => &mut config.sac,
            Self::Codac(config) => &mut config.sac,
        }
    }

    /// Constructs [`AgentConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`AgentConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Sets the dimensions of the networks and the target entropy `-act_dim`.
fn fill_dims(sac: &mut SacConfig<MlpConfig, MlpConfig>, obs_dim: usize, act_dim: usize) -> Result<()> {
    let policy = sac
        .actor_config
        .policy_config
        .as_mut()
        .ok_or_else(|| MbrlError::Configuration("no policy network configured".into()))?;
    policy.set_in_dim(obs_dim);
    policy.set_out_dim(act_dim);

    let q = sac
        .critic_config
        .q_config
        .as_mut()
        .ok_or_else(|| MbrlError::Configuration("no critic network configured".into()))?;
    q.set_in_dim(obs_dim + act_dim);

    if let EntCoefMode::Auto(target_entropy, _) = &mut sac.ent_coef_mode {
        *target_entropy = -(act_dim as f64);
    }
    Ok(())
}

/// Builds the agent of `algorithm`.
///
/// Fails with [`MbrlError::Configuration`] if `config` configures an agent with
/// a kind of critic other than the one of `algorithm`.
pub fn build_agent(
    algorithm: Algorithm,
    mut config: AgentConfig,
    obs_dim: usize,
    act_dim: usize,
) -> Result<Box<dyn Agent>> {
    let kind = algorithm.critic();
    if config.critic_kind() != kind {
        return Err(MbrlError::Configuration(format!(
            "{} trains a {:?} critic but the agent is configured with a {:?} critic",
            algorithm,
            kind,
            config.critic_kind()
        ))
        .into());
    }
    fill_dims(config.sac_config_mut(), obs_dim, act_dim)?;

    Ok(match config {
        AgentConfig::Sac(mut c) => {
            c.critic_config = c.critic_config.out_dim(1);
            Box::new(Sac::<Mlp, Mlp2>::build(c)?)
        }
        AgentConfig::Cql(mut c) => {
            c.sac.critic_config = c.sac.critic_config.out_dim(1);
            Box::new(Cql::<Mlp, Mlp2>::build(c)?)
        }
        AgentConfig::Codac(c) => Box::new(Codac::<Mlp, Mlp2>::build(c)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrl_core::{MixedBatch, TransitionBatch};
    use ndarray::Array2;
    use tempdir::TempDir;

    fn small(algorithm: Algorithm) -> AgentConfig {
        let sac = default_sac_config(&[16]);
        match algorithm.critic() {
            CriticKind::ModelFree => AgentConfig::Sac(sac),
            CriticKind::Conservative => {
                AgentConfig::Cql(CqlConfig::default().sac(sac).n_action_samples(2))
            }
            CriticKind::Distributional => AgentConfig::Codac(
                CodacConfig::default()
                    .sac(sac)
                    .n_quantiles(4)
                    .n_action_samples(2),
            ),
        }
    }

    fn batch(n: usize) -> MixedBatch {
        MixedBatch {
            real: TransitionBatch {
                obs: Array2::from_elem((n, 4), 0.1),
                act: Array2::from_elem((n, 1), -0.3),
                next_obs: Array2::from_elem((n, 4), 0.2),
                reward: vec![1.0; n],
                is_done: vec![0; n],
            },
            model: None,
            real_ratio: 1.0,
        }
    }

    #[test]
    fn test_build_every_algorithm() -> Result<()> {
        for algorithm in [
            Algorithm::Sac,
            Algorithm::Cql,
            Algorithm::Codac,
            Algorithm::Mopo,
            Algorithm::Combo,
            Algorithm::Dsac,
        ] {
            let mut agent = build_agent(algorithm, small(algorithm), 4, 1)?;
            let act = agent.select_action(&Array2::zeros((3, 4)))?;
            assert_eq!(act.dim(), (3, 1));
            assert!(act.iter().all(|a| a.abs() <= 1.0));
            let record = agent.update(batch(8))?;
            assert!(record.get_scalar("loss_critic")?.is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_mismatched_config() {
        let err = build_agent(Algorithm::Dsac, small(Algorithm::Sac), 4, 1).err().expect("expected configuration error");
        assert!(matches!(
            err.downcast_ref::<MbrlError>(),
            Some(MbrlError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_for() {
        assert_eq!(
            AgentConfig::default_for(Algorithm::Combo).critic_kind(),
            CriticKind::Conservative
        );
        assert_eq!(
            AgentConfig::default_for(Algorithm::Codac).critic_kind(),
            CriticKind::Distributional
        );
    }

    #[test]
    fn test_serde_agent_config() -> Result<()> {
        let config = AgentConfig::default_for(Algorithm::Dsac);
        let dir = TempDir::new("agent_config")?;
        let path = dir.path().join("agent.yaml");
        config.save(&path)?;
        assert_eq!(config, AgentConfig::load(&path)?);
        Ok(())
    }
}
