//! Configuration of SAC agent.
use super::ent_coef::EntCoefMode;
use crate::{
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig, CriticLoss, OutDim},
    Device,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Sac`](super::Sac).
///
/// `Q` and `P` are the configurations of the critic and policy networks.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacConfig<Q, P: OutDim> {
    /// Configuration of the actor.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the critics.
    pub critic_config: MultiCriticConfig<Q>,

    /// Discount factor.
    pub gamma: f64,

    /// Entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// Keeps the log Jacobian of tanh finite.
    pub epsilon: f64,

    /// Scale of rewards in Bellman targets.
    pub reward_scale: f32,

    /// Loss between predicted and target action values.
    pub critic_loss: CriticLoss,

    /// Device of the networks.
    pub device: Option<Device>,
}

impl<Q, P: OutDim> Default for SacConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            ent_coef_mode: EntCoefMode::Auto(-1.0, 3e-4),
            epsilon: 1e-4,
            reward_scale: 1.0,
            critic_loss: CriticLoss::Mse,
            device: None,
        }
    }
}

impl<Q, P> SacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize + OutDim,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the configuration of the critics.
    pub fn critic_config(mut self, v: MultiCriticConfig<Q>) -> Self {
        self.critic_config = v;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the entropy coefficient mode.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Sets the reward scale.
    pub fn reward_scale(mut self, v: f32) -> Self {
        self.reward_scale = v;
        self
    }

    /// Sets the critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Constructs [`SacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
