use super::{ProbEnsembleConfig, TerminationFn};
use crate::{
    mlp::{Mlp2, MlpConfig},
    model::SubModel1,
    opt::Optimizer,
    util::{array2_to_tensor, tensor_to_array2, to_scalar},
};
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};
use mbrl_core::{
    record::{Record, RecordValue},
    DynamicsModel, DynamicsPredictor, MbrlError, Prediction, TransitionBatch, TransitionPool,
};
use ndarray::{concatenate, s, Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::{collections::HashMap, fs, path::Path};

/// `log(1 + exp(x))`.
fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    Ok((x.relu()? + tail)?)
}

/// Ensemble of Gaussian dynamics models.
///
/// Each member maps a standardized `(s, a)` to the mean and the log variance of
/// `(s' - s, r)`. The members are trained together on independent bootstrap
/// minibatches. A prediction picks one member per row, samples from its
/// Gaussian and subtracts `penalty` times the largest standard deviation norm
/// among the members from the reward.
pub struct ProbEnsemble {
    members: Vec<Mlp2>,
    varmap: VarMap,
    opt: Optimizer,
    input_mean: Tensor,
    input_std: Tensor,
    obs_dim: usize,
    act_dim: usize,
    min_logvar: f64,
    max_logvar: f64,
    n_fit_steps: usize,
    batch_size: usize,
    penalty: f32,
    termination: TerminationFn,
    rng: StdRng,
    device: Device,
}

impl ProbEnsemble {
    /// Constructs the ensemble for the given dimensions of states and actions.
    pub fn build(config: ProbEnsembleConfig, obs_dim: usize, act_dim: usize) -> Result<Self> {
        if config.n_members == 0 {
            return Err(MbrlError::Configuration("n_members must be positive".into()).into());
        }
        let device = config.device.unwrap_or_default().build()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let in_dim = obs_dim + act_dim;

        let members = (0..config.n_members)
            .map(|i| {
                let member_config = MlpConfig::new(in_dim, config.units.clone(), obs_dim + 1, false);
                Mlp2::build(vb.pp(format!("member{}", i)), member_config)
            })
            .collect::<Result<Vec<_>>>()?;
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            members,
            varmap,
            opt,
            input_mean: Tensor::zeros((1, in_dim), DType::F32, &device)?,
            input_std: Tensor::ones((1, in_dim), DType::F32, &device)?,
            obs_dim,
            act_dim,
            min_logvar: config.min_logvar,
            max_logvar: config.max_logvar,
            n_fit_steps: config.n_fit_steps,
            batch_size: config.batch_size,
            penalty: config.penalty,
            termination: config.termination,
            rng: StdRng::seed_from_u64(config.seed),
            device,
        })
    }

    /// The number of members.
    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    fn inputs(&self, obs: &Array2<f32>, act: &Array2<f32>) -> Result<Tensor> {
        let x = concatenate(Axis(1), &[obs.view(), act.view()])?;
        let x = array2_to_tensor(&x, &self.device)?;
        Ok(x.broadcast_sub(&self.input_mean)?.broadcast_div(&self.input_std)?)
    }

    /// Mean and log variance, bounded softly to `[min_logvar, max_logvar]`.
    fn forward_member(&self, member: &Mlp2, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, raw) = member.forward(x)?;
        let logvar = softplus(&raw.affine(-1.0, self.max_logvar)?)?.affine(-1.0, self.max_logvar)?;
        let logvar = softplus(&logvar.affine(1.0, -self.min_logvar)?)?.affine(1.0, self.min_logvar)?;
        Ok((mean, logvar))
    }

    fn fit_scaler(&mut self, pool: &TransitionPool) -> Result<()> {
        let x = concatenate(Axis(1), &[pool.obs_view(), pool.act_view()])?;
        let in_dim = x.ncols();
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| MbrlError::EmptyPool {
            pool: pool.name().to_string(),
            requested: 1,
        })?;
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|v| if v < 1e-12 { 1.0 } else { v });

        self.input_mean = Tensor::from_vec(mean.to_vec(), (1, in_dim), &self.device)?;
        self.input_std = Tensor::from_vec(std.to_vec(), (1, in_dim), &self.device)?;
        Ok(())
    }

    /// Gaussian negative log-likelihood (up to constants) and squared error.
    fn member_loss(&self, member: &Mlp2, batch: TransitionBatch) -> Result<(Tensor, Tensor)> {
        let (obs, act, next_obs, reward, _) = batch.unpack();
        let n = reward.len();
        let delta = &next_obs - &obs;
        let reward = Array2::from_shape_vec((n, 1), reward)?;
        let tgt = concatenate(Axis(1), &[delta.view(), reward.view()])?;
        let tgt = array2_to_tensor(&tgt, &self.device)?;

        let x = self.inputs(&obs, &act)?;
        let (mean, logvar) = self.forward_member(member, &x)?;
        let sq = (mean - tgt)?.sqr()?;
        let nll = ((&sq * logvar.neg()?.exp()?)? + &logvar)?.mean_all()?;
        Ok((nll, sq.mean_all()?))
    }
}

impl DynamicsPredictor for ProbEnsemble {
    fn predict(&mut self, obs: &Array2<f32>, act: &Array2<f32>) -> Result<Prediction> {
        let n = obs.nrows();
        for (what, expected, actual) in [
            ("obs columns", self.obs_dim, obs.ncols()),
            ("act columns", self.act_dim, act.ncols()),
            ("act rows", n, act.nrows()),
        ] {
            if expected != actual {
                return Err(MbrlError::ShapeMismatch {
                    what: what.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        let x = self.inputs(obs, act)?;
        let mut means = Vec::with_capacity(self.members.len());
        let mut stds = Vec::with_capacity(self.members.len());
        for member in self.members.iter() {
            let (mean, logvar) = self.forward_member(member, &x)?;
            means.push(tensor_to_array2(&mean)?);
            stds.push(tensor_to_array2(&logvar.affine(0.5, 0.0)?.exp()?)?);
        }

        let mut next_obs = Array2::zeros((n, self.obs_dim));
        let mut reward = Vec::with_capacity(n);
        let mut is_done = Vec::with_capacity(n);
        for i in 0..n {
            let k = self.rng.gen_range(0..self.members.len());
            let rng = &mut self.rng;
            let sample = means[k]
                .row(i)
                .iter()
                .zip(stds[k].row(i).iter())
                .map(|(m, sd)| {
                    let e: f32 = rng.sample(StandardNormal);
                    m + sd * e
                })
                .collect::<Array1<f32>>();

            let next = &obs.row(i) + &sample.slice(s![..self.obs_dim]);
            let uncertainty = stds
                .iter()
                .map(|sd| sd.row(i).dot(&sd.row(i)).sqrt())
                .fold(0f32, f32::max);
            let r = sample[self.obs_dim] - self.penalty * uncertainty;

            is_done.push(self.termination.is_done(next.view()) || !r.is_finite());
            next_obs.row_mut(i).assign(&next);
            reward.push(r);
        }

        Ok(Prediction {
            next_obs,
            reward,
            is_done,
        })
    }
}

impl DynamicsModel for ProbEnsemble {
    fn fit(&mut self, pool: &mut TransitionPool) -> Result<Record> {
        if pool.is_empty() {
            return Err(MbrlError::EmptyPool {
                pool: pool.name().to_string(),
                requested: self.batch_size,
            }
            .into());
        }
        self.fit_scaler(pool)?;

        let n_members = self.members.len() as f32;
        let (mut loss_value, mut mse_value) = (f32::NAN, f32::NAN);
        for step in 0..self.n_fit_steps {
            let mut nlls = Vec::with_capacity(self.members.len());
            let mut mses = Vec::with_capacity(self.members.len());
            for member in self.members.iter() {
                let (nll, mse) = self.member_loss(member, pool.sample(self.batch_size)?)?;
                nlls.push(nll);
                mses.push(mse);
            }
            let loss = Tensor::stack(&nlls, 0)?.sum_all()?;
            self.opt.backward_step(&loss)?;

            loss_value = to_scalar(&loss)? / n_members;
            mse_value = to_scalar(&Tensor::stack(&mses, 0)?.mean_all()?)?;
            if (step + 1) % 100 == 0 {
                debug!("Ensemble fit step {}: loss {:.4}, mse {:.4}", step + 1, loss_value, mse_value);
            }
        }

        info!(
            "Fitted dynamics ensemble on {} transitions: loss {:.4}, mse {:.4}",
            pool.len(),
            loss_value,
            mse_value
        );
        Ok(Record::from_slice(&[
            ("model_loss", RecordValue::Scalar(loss_value)),
            ("model_mse", RecordValue::Scalar(mse_value)),
            ("model_fit_size", RecordValue::Scalar(pool.len() as f32)),
        ]))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.varmap.save(path.join("ensemble.safetensors"))?;
        let scaler = HashMap::from([
            ("mean".to_string(), self.input_mean.clone()),
            ("std".to_string(), self.input_std.clone()),
        ]);
        candle_core::safetensors::save(&scaler, path.join("ensemble_scaler.safetensors"))?;
        info!("Save dynamics ensemble to {:?}", path);
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.varmap.load(path.join("ensemble.safetensors"))?;
        let mut scaler =
            candle_core::safetensors::load(path.join("ensemble_scaler.safetensors"), &self.device)?;
        self.input_mean = scaler
            .remove("mean")
            .ok_or_else(|| anyhow!("no mean in the scaler of {:?}", path))?;
        self.input_std = scaler
            .remove("std")
            .ok_or_else(|| anyhow!("no std in the scaler of {:?}", path))?;
        info!("Load dynamics ensemble from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrl_core::{Transition, TransitionPoolConfig};
    use tempdir::TempDir;

    fn config() -> ProbEnsembleConfig {
        ProbEnsembleConfig::default()
            .n_members(3)
            .units(vec![32, 32])
            .batch_size(64)
            .seed(7)
    }

    /// `s' = s + 0.1 a`, `r = a_0`.
    fn linear_pool() -> Result<TransitionPool> {
        let mut pool = TransitionPool::build(&TransitionPoolConfig::default().capacity(500).dims(2, 2))?;
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..500 {
            let obs: Vec<f32> = (0..2).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let act: Vec<f32> = (0..2).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let next_obs = obs.iter().zip(act.iter()).map(|(s, a)| s + 0.1 * a).collect();
            pool.push(Transition::new(obs, act.clone(), act[0], next_obs, false))?;
        }
        Ok(pool)
    }

    #[test]
    fn test_predict_shapes() -> Result<()> {
        let mut model = ProbEnsemble::build(config(), 2, 2)?;
        let pred = model.predict(&Array2::zeros((5, 2)), &Array2::zeros((5, 2)))?;
        assert_eq!(pred.next_obs.dim(), (5, 2));
        assert_eq!(pred.reward.len(), 5);
        assert_eq!(pred.is_done, vec![false; 5]);
        Ok(())
    }

    #[test]
    fn test_predict_rejects_wrong_shapes() -> Result<()> {
        let mut model = ProbEnsemble::build(config(), 2, 2)?;
        assert!(model.predict(&Array2::zeros((5, 3)), &Array2::zeros((5, 2))).is_err());
        assert!(model.predict(&Array2::zeros((5, 2)), &Array2::zeros((4, 2))).is_err());
        Ok(())
    }

    #[test]
    fn test_fit_reduces_loss() -> Result<()> {
        let mut pool = linear_pool()?;
        let mut model = ProbEnsemble::build(config().n_fit_steps(1), 2, 2)?;
        let first = model.fit(&mut pool)?.get_scalar("model_mse")?;

        let mut model = ProbEnsemble::build(config().n_fit_steps(300), 2, 2)?;
        let record = model.fit(&mut pool)?;
        assert!(record.get_scalar("model_mse")? < first);
        assert_eq!(record.get_scalar("model_fit_size")?, 500.0);
        Ok(())
    }

    #[test]
    fn test_fit_on_empty_pool() -> Result<()> {
        let mut pool = TransitionPool::build(&TransitionPoolConfig::default().dims(2, 2))?;
        let mut model = ProbEnsemble::build(config(), 2, 2)?;
        let err = model.fit(&mut pool).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MbrlError>(),
            Some(MbrlError::EmptyPool { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_penalty_lowers_reward() -> Result<()> {
        let obs = Array2::from_elem((4, 2), 0.3f32);
        let act = Array2::from_elem((4, 2), -0.2f32);
        let dir = TempDir::new("ensemble_penalty")?;
        let base = ProbEnsemble::build(config().penalty(0.0), 2, 2)?;
        base.save_params(dir.path())?;

        let mut a = ProbEnsemble::build(config().penalty(0.0), 2, 2)?;
        let mut b = ProbEnsemble::build(config().penalty(5.0), 2, 2)?;
        a.load_params(dir.path())?;
        b.load_params(dir.path())?;
        let ra = a.predict(&obs, &act)?.reward;
        let rb = b.predict(&obs, &act)?.reward;
        for (x, y) in ra.iter().zip(rb.iter()) {
            assert!(y < x);
        }
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = TempDir::new("ensemble")?;
        let mut pool = linear_pool()?;
        let mut a = ProbEnsemble::build(config().n_fit_steps(5), 2, 2)?;
        a.fit(&mut pool)?;
        a.save_params(dir.path())?;

        let mut b = ProbEnsemble::build(config(), 2, 2)?;
        b.load_params(dir.path())?;
        let obs = Array2::from_elem((3, 2), 0.1f32);
        let act = Array2::from_elem((3, 2), 0.5f32);
        let pa = a.predict(&obs, &act)?;
        let pb = b.predict(&obs, &act)?;
        assert_eq!(pa.next_obs, pb.next_obs);
        assert_eq!(pa.reward, pb.reward);
        Ok(())
    }
}
