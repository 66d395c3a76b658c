use super::{
    actor::GaussianActor, critic::MultiCritic, log_sum_exp, mean_value, to_scalar,
    LagrangeMultiplier, OutDim,
};
use crate::model::{SubModel1, SubModel2};
use anyhow::Result;
use candle_core::{Device, Tensor};
use mbrl_core::record::{Record, RecordValue};
use serde::{de::DeserializeOwned, Serialize};

/// Gaps between soft maxima of values over sampled actions and values of
/// dataset actions, one scalar per critic network.
///
/// * `down_obs` - States where values of out-of-distribution actions are pushed down, `[m, obs_dim]`.
/// * `data_values` - Values of dataset transitions, `[n_data]` for each network.
///
/// For each state in `down_obs`, `n_samples` actions are drawn uniformly from
/// `[-1, 1]^act_dim` and `n_samples` from the current policy. The soft maximum
/// is the log-sum-exp of their values corrected by the log densities of the
/// sampling distributions. Critics outputting quantiles are reduced to the
/// mean of the quantiles.
pub fn conservative_gaps<Q, P>(
    critic: &MultiCritic<Q>,
    actor: &GaussianActor<P>,
    down_obs: &Tensor,
    data_values: &[Tensor],
    n_samples: usize,
    epsilon: f64,
) -> Result<Vec<Tensor>>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    let m = down_obs.dim(0)?;
    let act_dim = actor.out_dim();
    let obs_rep = down_obs.repeat((n_samples, 1))?;

    let a_rand = Tensor::rand(-1f32, 1f32, (n_samples * m, act_dim), down_obs.device())?;
    let log_density_rand = act_dim as f64 * 0.5f64.ln();
    let (a_pi, logp_pi) = actor.action_logp(&obs_rep, epsilon)?;
    let (a_pi, logp_pi) = (a_pi.detach(), logp_pi.detach());

    let q_rand = critic.forward_all(&obs_rep, &a_rand)?;
    let q_pi = critic.forward_all(&obs_rep, &a_pi)?;

    q_rand
        .iter()
        .zip(q_pi.iter())
        .zip(data_values.iter())
        .map(|((q_rand, q_pi), q_data)| -> Result<Tensor> {
            let r = mean_value(q_rand)?
                .affine(1.0, -log_density_rand)?
                .reshape((n_samples, m))?;
            let p = (mean_value(q_pi)? - &logp_pi)?.reshape((n_samples, m))?;
            let lse = log_sum_exp(&Tensor::cat(&[r, p], 0)?, 0)?;
            Ok((lse.mean_all()? - q_data.mean_all()?)?)
        })
        .collect()
}

/// Conservative penalty `weight * gap`, optionally tuned by a
/// [`LagrangeMultiplier`] to `alpha * (weight * gap - threshold)`.
pub struct ConservativePenalty {
    weight: f64,
    lagrange: Option<LagrangeMultiplier>,
}

impl ConservativePenalty {
    /// Constructs the penalty.
    ///
    /// The multiplier is used when `threshold` is given.
    pub fn new(
        weight: f64,
        threshold: Option<f64>,
        learning_rate: f64,
        device: &Device,
    ) -> Result<Self> {
        let lagrange = match threshold {
            Some(thresh) => Some(LagrangeMultiplier::new(thresh, learning_rate, device)?),
            None => None,
        };
        Ok(Self { weight, lagrange })
    }

    /// Returns the penalty summed over the networks and updates the multiplier.
    pub fn loss(&mut self, gaps: &[Tensor]) -> Result<(Tensor, Record)> {
        let scaled = gaps
            .iter()
            .map(|g| -> Result<Tensor> { Ok(g.affine(self.weight, 0.0)?) })
            .collect::<Result<Vec<Tensor>>>()?;
        let total = Tensor::stack(&scaled, 0)?.sum_all()?;
        let mean_gap = to_scalar(&Tensor::stack(gaps, 0)?.mean_all()?)?;
        let mut record = Record::from_scalar("conservative_gap", mean_gap);

        let loss = match &mut self.lagrange {
            None => total,
            Some(lagrange) => {
                let alpha = lagrange.alpha()?;
                let n = scaled.len() as f64;
                let shifted = total.affine(1.0, -n * lagrange.threshold())?;
                let loss = alpha.broadcast_mul(&shifted)?.sum_all()?;
                lagrange.update(&total.affine(1.0 / n, 0.0)?)?;
                record.insert("alpha_prime", RecordValue::Scalar(to_scalar(&alpha)?));
                loss
            }
        };

        Ok((loss, record))
    }

    /// The multiplier, if any.
    pub fn lagrange(&self) -> Option<&LagrangeMultiplier> {
        self.lagrange.as_ref()
    }

    /// The multiplier, if any.
    pub fn lagrange_mut(&mut self) -> Option<&mut LagrangeMultiplier> {
        self.lagrange.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        util::{actor::GaussianActorConfig, critic::MultiCriticConfig},
    };

    #[test]
    fn test_gaps() -> Result<()> {
        let actor = GaussianActor::<Mlp2>::build(
            GaussianActorConfig::default().policy_config(MlpConfig::new(3, vec![8], 2, false)),
            Device::Cpu,
        )?;
        let critic = MultiCritic::<Mlp>::build(
            MultiCriticConfig::default().q_config(MlpConfig::new(5, vec![8], 4, false)),
            Device::Cpu,
        )?;
        let obs = Tensor::randn(0f32, 1.0, (6, 3), &Device::Cpu)?;
        let data = vec![Tensor::zeros((6,), candle_core::DType::F32, &Device::Cpu)?; 2];
        let gaps = conservative_gaps(&critic, &actor, &obs, &data, 3, 1e-6)?;
        assert_eq!(gaps.len(), 2);
        for gap in &gaps {
            assert_eq!(gap.dims(), &[] as &[usize]);
            assert!(to_scalar(gap)?.is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_penalty_without_multiplier() -> Result<()> {
        let mut penalty = ConservativePenalty::new(5.0, None, 3e-4, &Device::Cpu)?;
        let gaps = vec![
            Tensor::new(1f32, &Device::Cpu)?,
            Tensor::new(3f32, &Device::Cpu)?,
        ];
        let (loss, record) = penalty.loss(&gaps)?;
        assert!((to_scalar(&loss)? - 20.0).abs() < 1e-5);
        assert_eq!(record.get_scalar("conservative_gap")?, 2.0);
        assert!(record.get_scalar("alpha_prime").is_err());
        Ok(())
    }

    #[test]
    fn test_penalty_with_multiplier() -> Result<()> {
        let mut penalty = ConservativePenalty::new(1.0, Some(10.0), 3e-4, &Device::Cpu)?;
        let gaps = vec![Tensor::new(1f32, &Device::Cpu)?; 2];
        let (loss, record) = penalty.loss(&gaps)?;
        // alpha = 1 before the update: 2 - 2 * 10
        assert!((to_scalar(&loss)? + 18.0).abs() < 1e-5);
        assert_eq!(record.get_scalar("alpha_prime")?, 1.0);
        Ok(())
    }
}
