use super::{CodacConfig, DistPenalty};
use crate::{
    model::{SubModel1, SubModel2},
    sac::Sac,
    util::{
        array2_to_tensor, conservative_gaps, critic::MultiCritic, mean_value, quantile_huber_loss,
        quantile_midpoints, to_scalar, ConservativePenalty, OutDim, RiskType,
    },
    TensorBatch,
};
use anyhow::Result;
use candle_core::Tensor;
use log::trace;
use mbrl_core::{
    record::{Record, RecordValue},
    Agent, MbrlError, MixedBatch,
};
use ndarray::Array2;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Conservative offline distributional actor-critic (CODAC) agent.
///
/// The critics output `n_quantiles` quantiles of the return distribution at
/// fixed midpoint fractions and are trained with the quantile Huber loss. The
/// conservative penalty acts on the means of the quantiles. The actor maximizes
/// the [`RiskType`] of the distribution given by the elementwise minimum of the
/// critics.
pub struct Codac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    sac: Sac<Q, P>,
    taus: Tensor,
    risk: RiskType,

    /// `[n_quantiles, 1]`
    risk_weights: Tensor,
    kappa: f64,
    penalty: Option<ConservativePenalty>,
    n_action_samples: usize,
}

impl<Q, P> Codac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs [`Codac`] agent.
    pub fn build(config: CodacConfig<Q::Config, P::Config>) -> Result<Self> {
        let n = config.n_quantiles;
        if n == 0 {
            return Err(MbrlError::Configuration("n_quantiles must be positive".into()).into());
        }
        config.risk.validate()?;

        let mut sac_config = config.sac;
        sac_config.critic_config = sac_config.critic_config.out_dim(n);
        let sac = Sac::build(sac_config)?;

        let taus = quantile_midpoints(n, &sac.device)?;
        let risk_weights = Tensor::from_vec(config.risk.weights(n), (n, 1), &sac.device)?;
        let penalty = match config.dist_penalty {
            DistPenalty::Uniform => Some(ConservativePenalty::new(
                config.min_z_weight,
                config.lagrange_thresh,
                config.lagrange_lr,
                &sac.device,
            )?),
            DistPenalty::Disabled => None,
        };

        Ok(Self {
            sac,
            taus,
            risk: config.risk,
            risk_weights,
            kappa: config.kappa,
            penalty,
            n_action_samples: config.n_action_samples,
        })
    }

    /// The number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.sac.n_opts
    }

    /// The risk measure maximized by the actor.
    pub fn risk(&self) -> RiskType {
        self.risk
    }

    /// Quantiles of the return distribution, `[n, n_quantiles]`, given states
    /// and actions.
    pub fn quantiles(&self, obs: &Array2<f32>, act: &Array2<f32>) -> Result<Array2<f32>> {
        let obs = array2_to_tensor(obs, &self.sac.device)?;
        let act = array2_to_tensor(act, &self.sac.device)?;
        let z = MultiCritic::<Q>::elementwise_min(self.sac.critic.forward_all(&obs, &act)?)?;
        crate::util::tensor_to_array2(&z)
    }

    /// Distributional soft Bellman targets, `[batch_size, n_quantiles]`.
    fn critic_target(&self, batch: &TensorBatch) -> Result<Tensor> {
        let sac = &self.sac;
        let (next_a, next_logp) = sac.actor.action_logp(&batch.next_obs, sac.epsilon)?;
        let z_next =
            MultiCritic::<Q>::elementwise_min(sac.critic.forward_all_tgt(&batch.next_obs, &next_a)?)?;
        let entropy = sac.ent_coef.alpha()?.broadcast_mul(&next_logp)?.unsqueeze(1)?;
        let soft = z_next.broadcast_sub(&entropy)?;

        let not_done = batch.is_done.affine(-1.0, 1.0)?.unsqueeze(1)?;
        let reward = batch.reward.affine(sac.reward_scale as f64, 0.0)?.unsqueeze(1)?;
        let tgt = reward.broadcast_add(&not_done.broadcast_mul(&soft)?.affine(sac.gamma, 0.0)?)?;
        Ok(tgt.detach())
    }

    fn update_critic(&mut self, batch: &TensorBatch) -> Result<(f32, Record)> {
        let tgt = self.critic_target(batch)?;
        let zs = self.sac.critic.forward_all(&batch.obs, &batch.act)?;
        let losses = zs
            .iter()
            .map(|z| quantile_huber_loss(z, &tgt, &self.taus, self.kappa))
            .collect::<Result<Vec<_>>>()?;
        let td_loss = Tensor::stack(&losses, 0)?.sum_all()?;

        let z_mean = to_scalar(&zs[0].mean_all()?)?;
        let mut record = Record::from_scalar("z_mean", z_mean);

        let loss = match &mut self.penalty {
            None => td_loss,
            Some(penalty) => {
                let down_obs = match batch.model_obs()? {
                    Some(obs) => obs,
                    None => batch.obs.clone(),
                };
                let data_values = zs
                    .iter()
                    .map(|z| -> Result<Tensor> {
                        Ok(mean_value(z)?.narrow(0, 0, batch.n_data_rows())?)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let gaps = conservative_gaps(
                    &self.sac.critic,
                    &self.sac.actor,
                    &down_obs,
                    &data_values,
                    self.n_action_samples,
                    self.sac.epsilon,
                )?;
                let (penalty, penalty_record) = penalty.loss(&gaps)?;
                record.merge_inplace(penalty_record);
                (td_loss + penalty)?
            }
        };

        self.sac.critic.backward_step(&loss)?;
        Ok((to_scalar(&loss)? / self.sac.critic.n_nets() as f32, record))
    }

    fn opt_(&mut self, batch: MixedBatch) -> Result<Record> {
        let batch = TensorBatch::from_mixed(batch, &self.sac.device)?;

        trace!("update_actor()");
        let weights = self.risk_weights.clone();
        let loss_actor = self.sac.update_actor_with(&batch.obs, move |critic, obs, act| {
            let z = MultiCritic::<Q>::elementwise_min(critic.forward_all(obs, act)?)?;
            Ok(z.matmul(&weights)?.squeeze(1)?)
        })?;

        trace!("update_critic()");
        let (loss_critic, record) = self.update_critic(&batch)?;

        self.sac.critic.soft_update()?;
        self.sac.n_opts += 1;

        let mut out = self.sac.loss_record(loss_critic, loss_actor)?.merge(record);
        out.insert("risk_param", RecordValue::Scalar(self.risk.param() as f32));
        Ok(out)
    }
}

impl<Q, P> Agent for Codac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    fn train(&mut self) {
        self.sac.train = true;
    }

    fn eval(&mut self) {
        self.sac.train = false;
    }

    fn is_train(&self) -> bool {
        self.sac.train
    }

    fn select_action(&mut self, obs: &Array2<f32>) -> Result<Array2<f32>> {
        self.sac.select_action_(obs)
    }

    fn update(&mut self, batch: MixedBatch) -> Result<Record> {
        self.opt_(batch)
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        self.sac.save_(path)?;
        if let Some(lagrange) = self.penalty.as_ref().and_then(|p| p.lagrange()) {
            lagrange.save(path.join("alpha_prime.safetensors"))?;
        }
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.sac.load_(path)?;
        if let Some(lagrange) = self.penalty.as_mut().and_then(|p| p.lagrange_mut()) {
            lagrange.load(path.join("alpha_prime.safetensors"))?;
        }
        Ok(())
    }
}
