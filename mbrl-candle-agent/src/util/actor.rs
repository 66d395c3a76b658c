//! Actor with Gaussian policy.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    util::OutDim,
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn normal_logp(x: &Tensor) -> Result<Tensor> {
    let c = -0.5 * (2.0 * std::f64::consts::PI).ln();
    Ok(x.sqr()?.affine(-0.5, c)?.sum(D::Minus1)?)
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`].
pub struct GaussianActorConfig<P: OutDim> {
    /// Configuration of the policy network.
    pub policy_config: Option<P>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Lower bound of log std.
    pub min_log_std: f64,

    /// Upper bound of log std.
    pub max_log_std: f64,
}

impl<P: OutDim> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            policy_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            min_log_std: -20.0,
            max_log_std: 2.0,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the minimum value of log std.
    pub fn min_log_std(mut self, v: f64) -> Self {
        self.min_log_std = v;
        self
    }

    /// Sets the maximum value of log std.
    pub fn max_log_std(mut self, v: f64) -> Self {
        self.max_log_std = v;
        self
    }

    /// Sets configurations for policy function.
    pub fn policy_config(mut self, v: P) -> Self {
        self.policy_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: usize) -> Self {
        if let Some(pi_config) = &mut self.policy_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Loads [`GaussianActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Actor with a tanh-squashed Gaussian policy.
///
/// Actions are in `[-1, 1]`.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    device: Device,
    varmap: VarMap,

    // Dimension of the action vector.
    out_dim: usize,

    policy: P,
    opt: Optimizer,

    min_log_std: f64,
    max_log_std: f64,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: Device) -> Result<Self> {
        let policy_config = config.policy_config.context("policy_config is not set.")?;
        let out_dim = policy_config.get_out_dim();
        let varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device).set_prefix("actor");
            P::build(vb, policy_config)?
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            out_dim,
            policy,
            opt,
            min_log_std: config.min_log_std,
            max_log_std: config.max_log_std,
        })
    }

    /// Dimension of actions.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Returns the mean and the clamped log std of the Gaussian given states.
    ///
    /// The shape of the both tensors is `(batch_size, action_dimension)`.
    pub fn forward(&self, obs: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, lstd) = self.policy.forward(obs)?;
        debug_assert_eq!(mean.dims()[1], self.out_dim);
        let lstd = lstd.clamp(self.min_log_std, self.max_log_std)?;
        Ok((mean, lstd))
    }

    /// Samples actions with the reparameterization trick and returns their
    /// log densities, `([batch_size, action_dimension], [batch_size])`.
    ///
    /// `epsilon` keeps the log Jacobian of tanh finite at the boundaries.
    pub fn action_logp(&self, obs: &Tensor, epsilon: f64) -> Result<(Tensor, Tensor)> {
        let (mean, lstd) = self.forward(obs)?;
        let std = lstd.exp()?;
        let z = mean.randn_like(0.0, 1.0)?;
        let act = (mean + (std * &z)?)?.tanh()?;

        let log_jacobian = act.sqr()?.affine(-1.0, 1.0 + epsilon)?.log()?.sum(D::Minus1)?;
        let logp = ((normal_logp(&z)? - lstd.sum(D::Minus1)?)? - log_jacobian)?;
        Ok((act, logp))
    }

    /// Samples actions.
    ///
    /// If `train` is `true`, actions are sampled from the Gaussian distribution.
    /// Otherwise, the mean of the distribution is returned.
    pub fn sample(&self, obs: &Tensor, train: bool) -> Result<Tensor> {
        let (mean, lstd) = self.forward(obs)?;
        let act = match train {
            true => (&mean + (lstd.exp()? * mean.randn_like(0.0, 1.0)?)?)?,
            false => mean,
        };
        Ok(act.tanh()?)
    }

    /// Updates the parameters given a loss.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Saves the parameters.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path.as_ref())?;
        info!("Save actor parameters to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path.as_ref())?;
        info!("Load actor parameters from {:?}", path.as_ref());
        Ok(())
    }
}
