//! Default implementation of the [`Evaluator`] trait.
//!
//! Runs a fixed number of episodes in a real environment and computes the
//! mean, the standard deviation and the CVaR of the episode rewards.
use super::{EvalRecord, Evaluator, ScoreNormalizer};
use crate::{Agent, Env, MbrlError};
use anyhow::Result;
use log::{debug, trace};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`DefaultEvaluator`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DefaultEvaluatorConfig {
    /// The number of episodes per evaluation.
    pub n_episodes: usize,

    /// The maximum number of steps in an episode.
    pub horizon: usize,

    /// Seed of the environment, applied at the start of every evaluation.
    pub seed: u64,

    /// Reference scores of the domain, if known.
    pub normalizer: Option<ScoreNormalizer>,
}

impl Default for DefaultEvaluatorConfig {
    fn default() -> Self {
        Self {
            n_episodes: 10,
            horizon: 1000,
            seed: 0,
            normalizer: None,
        }
    }
}

impl DefaultEvaluatorConfig {
    /// Sets the number of episodes.
    pub fn n_episodes(mut self, v: usize) -> Self {
        self.n_episodes = v;
        self
    }

    /// Sets the horizon of episodes.
    pub fn horizon(mut self, v: usize) -> Self {
        self.horizon = v;
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the reference scores.
    pub fn normalizer(mut self, v: Option<ScoreNormalizer>) -> Self {
        self.normalizer = v;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A default implementation of the [`Evaluator`] trait.
///
/// The environment is reseeded at the start of every call of
/// [`evaluate`](Evaluator::evaluate). With a deterministic policy, repeated
/// evaluations therefore produce identical reward sequences.
///
/// # Examples
///
/// ```ignore
/// let config = DefaultEvaluatorConfig::default().n_episodes(10).horizon(1000);
/// let mut evaluator = DefaultEvaluator::<MyEnv>::new(&config, &env_config)?;
/// let record = evaluator.evaluate(&mut agent)?;
/// println!("{}", record.log_line(0));
/// ```
pub struct DefaultEvaluator<E: Env> {
    config: DefaultEvaluatorConfig,
    env: E,
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs a new [`DefaultEvaluator`].
    pub fn new(config: &DefaultEvaluatorConfig, env_config: &E::Config) -> Result<Self> {
        if config.n_episodes == 0 {
            return Err(MbrlError::Configuration("n_episodes of the evaluator must be positive".into()).into());
        }
        if config.horizon == 0 {
            return Err(MbrlError::Configuration("horizon of the evaluator must be positive".into()).into());
        }
        Ok(Self {
            config: config.clone(),
            env: E::build(env_config, config.seed as i64)?,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DefaultEvaluatorConfig {
        &self.config
    }

    fn run_episode(&mut self, agent: &mut dyn Agent) -> Result<f32> {
        let mut obs = self.env.reset()?;
        let mut total = 0f32;

        for _ in 0..self.config.horizon {
            let obs_ = Array2::from_shape_vec((1, obs.len()), obs)?;
            let act = agent.select_action(&obs_)?.row(0).to_vec();
            let step = self.env.step(&act)?;
            total += step.reward;
            if step.is_terminated {
                break;
            }
            obs = step.obs;
        }

        Ok(total)
    }
}

impl<E: Env> Evaluator for DefaultEvaluator<E> {
    fn evaluate(&mut self, agent: &mut dyn Agent) -> Result<EvalRecord> {
        debug!("Evaluation");
        self.env.seed(self.config.seed);

        let mut rewards = Vec::with_capacity(self.config.n_episodes);
        for ix in 0..self.config.n_episodes {
            let r = self.run_episode(agent)?;
            trace!("Episode {}: {}", ix, r);
            rewards.push(r);
        }

        Ok(EvalRecord::from_rewards(rewards, self.config.normalizer.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyAgent, DummyEnv, DummyEnvConfig};

    #[test]
    fn test_deterministic_under_fixed_seed() -> Result<()> {
        let env_config = DummyEnvConfig::default().episode_len(7).reward_noise(1.0);
        let config = DefaultEvaluatorConfig::default().n_episodes(5).horizon(100).seed(3);
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&config, &env_config)?;
        let mut agent = DummyAgent::new(1, 1);
        agent.eval();

        let r1 = evaluator.evaluate(&mut agent)?;
        let r2 = evaluator.evaluate(&mut agent)?;
        assert_eq!(r1.rewards.len(), 5);
        assert_eq!(r1.rewards, r2.rewards);

        // Episodes differ from each other because of the noise
        assert!(r1.std > 0.0);
        Ok(())
    }

    #[test]
    fn test_horizon_truncates_episodes() -> Result<()> {
        let env_config = DummyEnvConfig::default().episode_len(50);
        let config = DefaultEvaluatorConfig::default().n_episodes(2).horizon(10);
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&config, &env_config)?;
        let mut agent = DummyAgent::new(1, 1);
        let record = evaluator.evaluate(&mut agent)?;
        assert_eq!(record.rewards, vec![10.0, 10.0]);
        assert_eq!(agent.counters().borrow().n_updates, 0);
        Ok(())
    }

    #[test]
    fn test_normalized_score() -> Result<()> {
        let env_config = DummyEnvConfig::default().episode_len(5);
        let config = DefaultEvaluatorConfig::default()
            .n_episodes(3)
            .normalizer(Some(ScoreNormalizer::new(0.0, 5.0)));
        let mut evaluator = DefaultEvaluator::<DummyEnv>::new(&config, &env_config)?;
        let record = evaluator.evaluate(&mut DummyAgent::new(1, 1))?;
        assert_eq!(record.mean, 5.0);
        assert_eq!(record.normalized_score, Some(100.0));
        Ok(())
    }

    #[test]
    fn test_zero_episodes() {
        let config = DefaultEvaluatorConfig::default().n_episodes(0);
        assert!(DefaultEvaluator::<DummyEnv>::new(&config, &DummyEnvConfig::default()).is_err());
    }
}
