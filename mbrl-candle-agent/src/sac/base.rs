use super::{EntCoef, SacConfig};
use crate::{
    model::{SubModel1, SubModel2},
    util::{
        actor::GaussianActor, array2_to_tensor, critic::MultiCritic, tensor_to_array2, to_scalar,
        CriticLoss, OutDim,
    },
    TensorBatch,
};
use anyhow::Result;
use candle_core::{Device, Tensor};
use log::trace;
use mbrl_core::{
    record::{Record, RecordValue},
    Agent, MixedBatch,
};
use ndarray::Array2;
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, path::Path};

/// Soft actor critic (SAC) agent.
///
/// Trains on minibatches as they are given, so the same agent serves the
/// model-free and the model-based (MOPO) settings.
pub struct Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(crate) critic: MultiCritic<Q>,
    pub(crate) actor: GaussianActor<P>,
    pub(crate) ent_coef: EntCoef,
    pub(crate) gamma: f64,
    pub(crate) epsilon: f64,
    pub(crate) reward_scale: f32,
    pub(crate) critic_loss: CriticLoss,
    pub(crate) train: bool,
    pub(crate) n_opts: usize,
    pub(crate) device: Device,
}

impl<Q, P> Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs [`Sac`] agent.
    pub fn build(config: SacConfig<Q::Config, P::Config>) -> Result<Self> {
        let device = config.device.unwrap_or_default().build()?;
        let actor = GaussianActor::build(config.actor_config, device.clone())?;
        let critic = MultiCritic::build(config.critic_config, device.clone())?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, &device)?;

        Ok(Self {
            critic,
            actor,
            ent_coef,
            gamma: config.gamma,
            epsilon: config.epsilon,
            reward_scale: config.reward_scale,
            critic_loss: config.critic_loss,
            train: true,
            n_opts: 0,
            device,
        })
    }

    /// The number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Soft Bellman targets `r + (1 - done) * gamma * (min Q_tgt(s', a') - alpha * log pi(a'|s'))`.
    pub(crate) fn critic_target(&self, batch: &TensorBatch) -> Result<Tensor> {
        let (next_a, next_logp) = self.actor.action_logp(&batch.next_obs, self.epsilon)?;
        let next_q = self.critic.qvals_min_tgt(&batch.next_obs, &next_a)?;
        let next_v = (next_q - self.ent_coef.alpha()?.broadcast_mul(&next_logp)?)?;
        let not_done = batch.is_done.affine(-1.0, 1.0)?;
        let reward = batch.reward.affine(self.reward_scale as f64, 0.0)?;
        let tgt = (reward + (not_done * next_v)?.affine(self.gamma, 0.0)?)?;
        Ok(tgt.detach())
    }

    /// Sum over critics of the losses between predictions and targets.
    pub(crate) fn bellman_loss(&self, preds: &[Tensor], tgt: &Tensor) -> Result<Tensor> {
        let losses = preds
            .iter()
            .map(|pred| self.critic_loss.loss(pred, tgt))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::stack(&losses, 0)?.sum_all()?)
    }

    fn update_critic(&mut self, batch: &TensorBatch) -> Result<f32> {
        let tgt = self.critic_target(batch)?;
        let preds = self.critic.qvals(&batch.obs, &batch.act)?;
        let loss = self.bellman_loss(&preds, &tgt)?;
        self.critic.backward_step(&loss)?;
        Ok(to_scalar(&loss)? / self.critic.n_nets() as f32)
    }

    /// Updates the entropy coefficient and the actor, which maximizes
    /// `value(s, a) - alpha * log pi(a|s)` for `a` sampled from the policy.
    ///
    /// `value` maps the critic, states and actions to values, `[batch_size]`.
    pub(crate) fn update_actor_with<F>(&mut self, obs: &Tensor, value: F) -> Result<f32>
    where
        F: Fn(&MultiCritic<Q>, &Tensor, &Tensor) -> Result<Tensor>,
    {
        let (a, logp) = self.actor.action_logp(obs, self.epsilon)?;
        self.ent_coef.update(&logp)?;

        let v = value(&self.critic, obs, &a)?;
        let loss = (self.ent_coef.alpha()?.broadcast_mul(&logp)? - v)?.mean_all()?;
        self.actor.backward_step(&loss)?;
        Ok(to_scalar(&loss)?)
    }

    fn update_actor(&mut self, obs: &Tensor) -> Result<f32> {
        self.update_actor_with(obs, |critic, obs, act| critic.qvals_min(obs, act))
    }

    /// Record of the losses and the entropy coefficient.
    pub(crate) fn loss_record(&self, loss_critic: f32, loss_actor: f32) -> Result<Record> {
        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            ("ent_coef", RecordValue::Scalar(self.ent_coef.alpha_value()?)),
        ]))
    }

    fn opt_(&mut self, batch: MixedBatch) -> Result<Record> {
        let batch = TensorBatch::from_mixed(batch, &self.device)?;

        trace!("update_actor()");
        let loss_actor = self.update_actor(&batch.obs)?;

        trace!("update_critic()");
        let loss_critic = self.update_critic(&batch)?;

        trace!("soft_update()");
        self.critic.soft_update()?;
        self.n_opts += 1;

        self.loss_record(loss_critic, loss_actor)
    }

    pub(crate) fn select_action_(&self, obs: &Array2<f32>) -> Result<Array2<f32>> {
        let obs = array2_to_tensor(obs, &self.device)?;
        let act = self.actor.sample(&obs, self.train)?;
        tensor_to_array2(&act)
    }

    pub(crate) fn save_(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.critic.save(path, "qnet")?;
        self.actor.save(path.join("pi.safetensors"))?;
        self.ent_coef.save(path.join("ent_coef.safetensors"))?;
        Ok(())
    }

    pub(crate) fn load_(&mut self, path: &Path) -> Result<()> {
        self.critic.load(path, "qnet")?;
        self.actor.load(path.join("pi.safetensors"))?;
        self.ent_coef.load(path.join("ent_coef.safetensors"))?;
        Ok(())
    }
}

impl<Q, P> Agent for Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn select_action(&mut self, obs: &Array2<f32>) -> Result<Array2<f32>> {
        self.select_action_(obs)
    }

    fn update(&mut self, batch: MixedBatch) -> Result<Record> {
        self.opt_(batch)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.save_(path)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.load_(path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        util::{actor::GaussianActorConfig, critic::MultiCriticConfig},
    };
    use mbrl_core::TransitionBatch;

    pub(crate) fn mixed_batch(n_real: usize, n_model: usize) -> MixedBatch {
        let part = |n: usize, offset: f32| TransitionBatch {
            obs: Array2::from_shape_fn((n, 3), |(i, j)| offset + (i + j) as f32 * 0.1),
            act: Array2::from_shape_fn((n, 2), |(i, _)| (i as f32 * 0.3).sin()),
            next_obs: Array2::from_shape_fn((n, 3), |(i, j)| offset + (i + j + 1) as f32 * 0.1),
            reward: (0..n).map(|i| i as f32 * 0.5).collect(),
            is_done: (0..n).map(|i| (i % 4 == 3) as i8).collect(),
        };
        let model = match n_model {
            0 => None,
            n => Some(part(n, 1.0)),
        };
        MixedBatch {
            real: part(n_real, 0.0),
            model,
            real_ratio: n_real as f32 / (n_real + n_model) as f32,
        }
    }

    pub(crate) fn sac_config() -> SacConfig<MlpConfig, MlpConfig> {
        SacConfig::default()
            .actor_config(
                GaussianActorConfig::default().policy_config(MlpConfig::new(3, vec![16], 2, false)),
            )
            .critic_config(
                MultiCriticConfig::default().q_config(MlpConfig::new(5, vec![16], 1, false)),
            )
    }

    #[test]
    fn test_update() -> Result<()> {
        let mut sac = Sac::<Mlp, Mlp2>::build(sac_config())?;
        for _ in 0..3 {
            let record = sac.update(mixed_batch(8, 0))?;
            assert!(record.get_scalar("loss_critic")?.is_finite());
            assert!(record.get_scalar("loss_actor")?.is_finite());
            assert!(record.get_scalar("ent_coef")? > 0.0);
        }
        assert_eq!(sac.n_opts(), 3);
        Ok(())
    }

    #[test]
    fn test_update_on_mixed_batch() -> Result<()> {
        let mut sac = Sac::<Mlp, Mlp2>::build(sac_config())?;
        let record = sac.update(mixed_batch(2, 6))?;
        assert!(record.get_scalar("loss_critic")?.is_finite());
        Ok(())
    }

    #[test]
    fn test_select_action_modes() -> Result<()> {
        let mut sac = Sac::<Mlp, Mlp2>::build(sac_config())?;
        let obs = Array2::from_elem((4, 3), 0.5f32);
        assert_eq!(sac.select_action(&obs)?.dim(), (4, 2));

        sac.eval();
        assert!(!sac.is_train());
        let a1 = sac.select_action(&obs)?;
        let a2 = sac.select_action(&obs)?;
        assert_eq!(a1, a2);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempdir::TempDir::new("sac")?;
        let obs = Array2::from_elem((2, 3), 0.1f32);
        let mut a = Sac::<Mlp, Mlp2>::build(sac_config())?;
        a.update(mixed_batch(8, 0))?;
        a.eval();
        a.save_params(dir.path())?;
        for file in ["qnet.safetensors", "qnet_tgt.safetensors", "pi.safetensors", "ent_coef.safetensors"] {
            assert!(dir.path().join(file).exists());
        }

        let mut b = Sac::<Mlp, Mlp2>::build(sac_config())?;
        b.eval();
        b.load_params(dir.path())?;
        assert_eq!(a.select_action(&obs)?, b.select_action(&obs)?);
        Ok(())
    }
}
