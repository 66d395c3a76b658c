use super::CqlConfig;
use crate::{
    model::{SubModel1, SubModel2},
    sac::Sac,
    util::{conservative_gaps, to_scalar, ConservativePenalty, OutDim},
    TensorBatch,
};
use anyhow::Result;
use candle_core::Tensor;
use log::trace;
use mbrl_core::{record::Record, Agent, MixedBatch};
use ndarray::Array2;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Conservative Q-learning (CQL) agent.
///
/// SAC whose critic loss adds `min_q_weight * (logsumexp_a Q(s, a) - Q(s, a_data))`.
/// On minibatches with model transitions (COMBO), values are pushed down on the
/// states of model transitions and pushed up on real transitions.
pub struct Cql<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    sac: Sac<Q, P>,
    penalty: ConservativePenalty,
    n_action_samples: usize,
}

impl<Q, P> Cql<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Constructs [`Cql`] agent.
    pub fn build(config: CqlConfig<Q::Config, P::Config>) -> Result<Self> {
        let sac = Sac::build(config.sac)?;
        let penalty = ConservativePenalty::new(
            config.min_q_weight,
            config.lagrange_thresh,
            config.lagrange_lr,
            &sac.device,
        )?;

        Ok(Self {
            sac,
            penalty,
            n_action_samples: config.n_action_samples,
        })
    }

    /// The number of optimization steps.
    pub fn n_opts(&self) -> usize {
        self.sac.n_opts
    }

    fn update_critic(&mut self, batch: &TensorBatch) -> Result<(f32, Record)> {
        let sac = &self.sac;
        let tgt = sac.critic_target(batch)?;
        let preds = sac.critic.qvals(&batch.obs, &batch.act)?;
        let bellman = sac.bellman_loss(&preds, &tgt)?;

        let down_obs = match batch.model_obs()? {
            Some(obs) => obs,
            None => batch.obs.clone(),
        };
        let data_values = preds
            .iter()
            .map(|q| q.narrow(0, 0, batch.n_data_rows()))
            .collect::<Result<Vec<_>, _>>()?;
        let gaps = conservative_gaps(
            &sac.critic,
            &sac.actor,
            &down_obs,
            &data_values,
            self.n_action_samples,
            sac.epsilon,
        )?;
        let (penalty, record) = self.penalty.loss(&gaps)?;

        let loss = (bellman + penalty)?;
        self.sac.critic.backward_step(&loss)?;
        Ok((to_scalar(&loss)? / self.sac.critic.n_nets() as f32, record))
    }

    fn opt_(&mut self, batch: MixedBatch) -> Result<Record> {
        let batch = TensorBatch::from_mixed(batch, &self.sac.device)?;

        trace!("update_actor()");
        let loss_actor = self
            .sac
            .update_actor_with(&batch.obs, |critic, obs, act| critic.qvals_min(obs, act))?;

        trace!("update_critic()");
        let (loss_critic, record) = self.update_critic(&batch)?;

        self.sac.critic.soft_update()?;
        self.sac.n_opts += 1;

        Ok(self.sac.loss_record(loss_critic, loss_actor)?.merge(record))
    }
}

impl<Q, P> Agent for Cql<Q, P>
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
        if let Some(lagrange) = self.penalty.lagrange() {
            lagrange.save(path.join("alpha_prime.safetensors"))?;
        }
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.sac.load_(path)?;
        if let Some(lagrange) = self.penalty.lagrange_mut() {
            lagrange.load(path.join("alpha_prime.safetensors"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2},
        sac::{mixed_batch, sac_config},
    };

    #[test]
    fn test_update_records_gap() -> Result<()> {
        let config = CqlConfig::default().sac(sac_config()).n_action_samples(4);
        let mut cql = Cql::<Mlp, Mlp2>::build(config)?;
        for _ in 0..2 {
            let record = cql.update(mixed_batch(8, 0))?;
            assert!(record.get_scalar("loss_critic")?.is_finite());
            assert!(record.get_scalar("conservative_gap")?.is_finite());
        }
        assert_eq!(cql.n_opts(), 2);
        Ok(())
    }

    #[test]
    fn test_lagrange_on_mixed_batch() -> Result<()> {
        let config = CqlConfig::default()
            .sac(sac_config())
            .n_action_samples(2)
            .lagrange_thresh(Some(10.0));
        let mut cql = Cql::<Mlp, Mlp2>::build(config)?;
        let record = cql.update(mixed_batch(2, 6))?;
        assert!(record.get_scalar("alpha_prime").is_ok());

        let dir = tempdir::TempDir::new("cql")?;
        cql.save_params(dir.path())?;
        assert!(dir.path().join("alpha_prime.safetensors").exists());
        cql.load_params(dir.path())?;
        Ok(())
    }
}
