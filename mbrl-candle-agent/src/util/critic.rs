//! Critic for agents with continuous action.
use crate::{
    model::SubModel2,
    opt::{Optimizer, OptimizerConfig},
    util::{track_with_replace_substring, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType::F32, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MultiCritic`].
pub struct MultiCriticConfig<Q> {
    /// The number of critic networks.
    pub n_nets: usize,

    /// Configuration of critic networks.
    pub q_config: Option<Q>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,

    /// Soft update coefficient.
    pub tau: f64,
}

impl<Q> Default for MultiCriticConfig<Q> {
    fn default() -> Self {
        Self {
            n_nets: 2,
            q_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0003 },
            tau: 0.005,
        }
    }
}

impl<Q> MultiCriticConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the number of critic networks.
    pub fn n_nets(mut self, v: usize) -> Self {
        self.n_nets = v;
        self
    }

    /// Sets configurations for action-value function.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the output dimension of critic networks.
    pub fn out_dim(mut self, v: usize) -> Self {
        if let Some(q_config) = &mut self.q_config {
            q_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets soft update parameter tau.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Constructs [`MultiCriticConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MultiCriticConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Critic for agents with continuous action.
///
/// It takes states and actions as inputs. Each network outputs either an action
/// value (`out_dim == 1`) or quantiles of the return distribution.
///
/// This struct has multiple networks and corresponding target networks.
pub struct MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize,
{
    tau: f64,
    varmap: VarMap,
    varmap_tgt: VarMap,
    qs: Vec<Q>,
    qs_tgt: Vec<Q>,
    opt: Optimizer,
}

impl<Q> MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`MultiCritic`].
    pub fn build(config: MultiCriticConfig<Q::Config>, device: Device) -> Result<Self> {
        let n_nets = config.n_nets;
        let q_config = config.q_config.context("q_config is not set.")?;

        let (varmap, qs) = Self::build_critic_networks(&q_config, &device, n_nets, "critic")?;
        let (varmap_tgt, qs_tgt) =
            Self::build_critic_networks(&q_config, &device, n_nets, "critic_tgt")?;

        // Optimizer shared by the critic networks
        let opt = config.opt_config.build(varmap.all_vars())?;

        track_with_replace_substring(&varmap_tgt, &varmap, 1.0, ("critic", "critic_tgt"))?;

        Ok(Self {
            tau: config.tau,
            varmap,
            varmap_tgt,
            qs,
            qs_tgt,
            opt,
        })
    }

    fn build_critic_networks(
        q_config: &Q::Config,
        device: &Device,
        n_nets: usize,
        prefix: &str,
    ) -> Result<(VarMap, Vec<Q>)> {
        let varmap = VarMap::new();
        let qs = (0..n_nets)
            .map(|ix| {
                let vb = VarBuilder::from_varmap(&varmap, F32, device)
                    .set_prefix(format!("{}{}", prefix, ix));
                Q::build(vb, q_config.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((varmap, qs))
    }
}

impl<Q> MultiCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize,
{
    /// The number of critic networks.
    pub fn n_nets(&self) -> usize {
        self.qs.len()
    }

    /// Moves the target networks towards the critic networks.
    pub fn soft_update(&mut self) -> Result<()> {
        track_with_replace_substring(
            &self.varmap_tgt,
            &self.varmap,
            self.tau,
            ("critic", "critic_tgt"),
        )
    }

    /// Outputs of all critic networks, `[batch_size, out_dim]` each.
    pub fn forward_all(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        self.qs.iter().map(|q| q.forward(obs, act)).collect()
    }

    /// Outputs of all target networks, `[batch_size, out_dim]` each.
    pub fn forward_all_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        self.qs_tgt.iter().map(|q| q.forward(obs, act)).collect()
    }

    /// Returns action values of all critics, `[batch_size]` each.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Result<Vec<Tensor>> {
        self.forward_all(obs, act)?
            .into_iter()
            .map(|q| -> Result<Tensor> { Ok(q.squeeze(D::Minus1)?) })
            .collect()
    }

    /// Returns the minimum action values over the critics, `[batch_size]`.
    pub fn qvals_min(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Self::elementwise_min(self.forward_all(obs, act)?)?
            .squeeze(D::Minus1)
            .map_err(Into::into)
    }

    /// Returns the minimum action values over the target critics, `[batch_size]`.
    pub fn qvals_min_tgt(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        Self::elementwise_min(self.forward_all_tgt(obs, act)?)?
            .squeeze(D::Minus1)
            .map_err(Into::into)
    }

    /// Elementwise minimum of the outputs of the networks.
    pub fn elementwise_min(outputs: Vec<Tensor>) -> Result<Tensor> {
        Ok(Tensor::stack(&outputs, 0)?.min(0)?)
    }

    /// Backward step for all variables in critic networks.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Saves the critic and target networks in `{dir}/{name}.safetensors` and
    /// `{dir}/{name}_tgt.safetensors`.
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        let path = dir.join(format!("{}.safetensors", name));
        self.varmap.save(&path)?;
        let path_tgt = dir.join(format!("{}_tgt.safetensors", name));
        self.varmap_tgt.save(&path_tgt)?;
        info!("Save critics to {:?}", path);
        Ok(())
    }

    /// Loads the files written by [`MultiCritic::save`].
    pub fn load(&mut self, dir: &Path, name: &str) -> Result<()> {
        let path = dir.join(format!("{}.safetensors", name));
        self.varmap.load(&path)?;
        let path_tgt = dir.join(format!("{}_tgt.safetensors", name));
        self.varmap_tgt.load(&path_tgt)?;
        info!("Load critics from {:?}", path);
        Ok(())
    }
}
