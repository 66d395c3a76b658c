//! Configuration of [`Trainer`](super::Trainer).
use crate::{Algorithm, MbrlError, RolloutConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
///
/// Built once at startup and never modified by the trainer.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// The algorithm being trained.
    pub algorithm: Algorithm,

    /// The number of epochs.
    pub num_epoch: usize,

    /// The number of steps in an epoch.
    pub epoch_length: usize,

    /// Interval of model rollouts in steps within an epoch.
    pub model_train_freq: usize,

    /// Fraction of a minibatch drawn from the real pool.
    pub real_ratio: f32,

    /// Interval of agent updates in total steps.
    pub train_every_n_steps: usize,

    /// The number of agent updates per step.
    pub num_train_repeat: usize,

    /// Upper bound of agent updates per step.
    pub max_train_repeat_per_step: usize,

    /// Size of a minibatch.
    pub policy_train_batch_size: usize,

    /// Checkpoints are taken every `num_epoch / save_divisor` epochs.
    pub save_divisor: usize,

    /// Evaluations are run every `num_epoch / eval_divisor` epochs.
    pub eval_divisor: usize,

    /// Configuration of model rollouts.
    pub rollout: RolloutConfig,

    /// Root directory of checkpoints. Checkpoints are not saved if `None`.
    pub model_dir: Option<String>,

    /// If `true`, the dynamics model is not fitted before training.
    pub model_pretrained: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Codac,
            num_epoch: 1000,
            epoch_length: 1000,
            model_train_freq: 1000,
            real_ratio: 0.05,
            train_every_n_steps: 1,
            num_train_repeat: 1,
            max_train_repeat_per_step: 5,
            policy_train_batch_size: 256,
            save_divisor: 1,
            eval_divisor: 100,
            rollout: RolloutConfig::default(),
            model_dir: None,
            model_pretrained: false,
        }
    }
}

impl TrainerConfig {
    /// Sets the algorithm.
    pub fn algorithm(mut self, v: Algorithm) -> Self {
        self.algorithm = v;
        self
    }

    /// Sets the number of epochs.
    pub fn num_epoch(mut self, v: usize) -> Self {
        self.num_epoch = v;
        self
    }

    /// Sets the number of steps in an epoch.
    pub fn epoch_length(mut self, v: usize) -> Self {
        self.epoch_length = v;
        self
    }

    /// Sets the interval of model rollouts.
    pub fn model_train_freq(mut self, v: usize) -> Self {
        self.model_train_freq = v;
        self
    }

    /// Sets the real ratio.
    pub fn real_ratio(mut self, v: f32) -> Self {
        self.real_ratio = v;
        self
    }

    /// Sets the interval of agent updates.
    pub fn train_every_n_steps(mut self, v: usize) -> Self {
        self.train_every_n_steps = v;
        self
    }

    /// Sets the number of agent updates per step.
    pub fn num_train_repeat(mut self, v: usize) -> Self {
        self.num_train_repeat = v;
        self
    }

    /// Sets the upper bound of agent updates per step.
    pub fn max_train_repeat_per_step(mut self, v: usize) -> Self {
        self.max_train_repeat_per_step = v;
        self
    }

    /// Sets the minibatch size.
    pub fn policy_train_batch_size(mut self, v: usize) -> Self {
        self.policy_train_batch_size = v;
        self
    }

    /// Sets the divisor of the checkpoint interval.
    pub fn save_divisor(mut self, v: usize) -> Self {
        self.save_divisor = v;
        self
    }

    /// Sets the divisor of the evaluation interval.
    pub fn eval_divisor(mut self, v: usize) -> Self {
        self.eval_divisor = v;
        self
    }

    /// Sets the rollout configuration.
    pub fn rollout(mut self, v: RolloutConfig) -> Self {
        self.rollout = v;
        self
    }

    /// Sets the checkpoint directory.
    pub fn model_dir(mut self, v: impl Into<String>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    /// Sets whether the dynamics model is already fitted.
    pub fn model_pretrained(mut self, v: bool) -> Self {
        self.model_pretrained = v;
        self
    }

    /// Returns `true` if minibatches include model transitions.
    pub fn uses_model(&self) -> bool {
        self.real_ratio < 1.0
    }

    /// Interval of evaluation in epochs.
    pub fn eval_interval(&self) -> usize {
        (self.num_epoch / self.eval_divisor.max(1)).max(1)
    }

    /// Interval of checkpoints in epochs.
    pub fn save_interval(&self) -> usize {
        (self.num_epoch / self.save_divisor.max(1)).max(1)
    }

    /// Capacity of the model pool.
    pub fn model_pool_capacity(&self) -> usize {
        self.rollout
            .model_pool_capacity(self.epoch_length, self.model_train_freq)
    }

    /// The number of transitions drawn from the real and the model pool per update.
    pub fn batch_split(&self) -> (usize, usize) {
        let n = self.policy_train_batch_size;
        let n_real = ((n as f32 * self.real_ratio).floor() as usize).min(n);
        (n_real, n - n_real)
    }

    /// The number of agent updates in a step where updates happen.
    pub fn updates_per_step(&self) -> usize {
        self.num_train_repeat.min(self.max_train_repeat_per_step)
    }

    /// Checks the consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        let err = |msg: String| -> Result<()> { Err(MbrlError::Configuration(msg).into()) };

        if !(0.0..=1.0).contains(&self.real_ratio) {
            return err(format!("real_ratio must be in [0, 1], got {}", self.real_ratio));
        }
        if self.algorithm.is_model_free() && self.uses_model() {
            return err(format!(
                "{} is model-free and requires real_ratio = 1.0, got {}",
                self.algorithm, self.real_ratio
            ));
        }
        for (name, v) in [
            ("num_epoch", self.num_epoch),
            ("epoch_length", self.epoch_length),
            ("model_train_freq", self.model_train_freq),
            ("train_every_n_steps", self.train_every_n_steps),
            ("policy_train_batch_size", self.policy_train_batch_size),
            ("save_divisor", self.save_divisor),
            ("eval_divisor", self.eval_divisor),
        ] {
            if v == 0 {
                return err(format!("{} must be positive", name));
            }
        }
        if self.uses_model() {
            if self.rollout.rollout_length == 0 {
                return err("rollout_length must be positive for model-based training".into());
            }
            if self.rollout.rollout_batch_size == 0 {
                return err("rollout_batch_size must be positive for model-based training".into());
            }
        }
        Ok(())
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
