//! Deterministic collaborators used in tests.
//!
//! The agent and the dynamics model share their call counters through
//! `Rc<RefCell<_>>`, so tests can inspect them after handing the objects to the
//! [`Trainer`](crate::Trainer).
use crate::{
    record::{Record, RecordValue::Scalar},
    Agent, BoxSpace, DynamicsModel, DynamicsPredictor, Env, MbrlError, MixedBatch, Prediction,
    Step, TransitionPool,
};
use anyhow::Result;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{cell::RefCell, fs, path::Path, rc::Rc};

/// Configuration of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// The episode terminates after this number of steps.
    pub episode_len: usize,

    /// Scale of the uniform noise added to the unit reward.
    pub reward_noise: f32,
}

impl Default for DummyEnvConfig {
    fn default() -> Self {
        Self {
            obs_dim: 1,
            act_dim: 1,
            episode_len: 10,
            reward_noise: 0.0,
        }
    }
}

impl DummyEnvConfig {
    /// Sets the episode length.
    pub fn episode_len(mut self, v: usize) -> Self {
        self.episode_len = v;
        self
    }

    /// Sets the reward noise.
    pub fn reward_noise(mut self, v: f32) -> Self {
        self.reward_noise = v;
        self
    }

    /// Sets the dimensions of observations and actions.
    pub fn dims(mut self, obs_dim: usize, act_dim: usize) -> Self {
        self.obs_dim = obs_dim;
        self.act_dim = act_dim;
        self
    }
}

/// An environment whose observation is the step count of the episode.
///
/// The reward is `1 + reward_noise * u` with `u ~ U[0, 1)`.
pub struct DummyEnv {
    config: DummyEnvConfig,
    t: usize,
    rng: StdRng,
    obs_space: BoxSpace,
    act_space: BoxSpace,
}

impl Env for DummyEnv {
    type Config = DummyEnvConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            t: 0,
            rng: StdRng::seed_from_u64(seed as u64),
            obs_space: BoxSpace::uniform(config.obs_dim, f32::NEG_INFINITY, f32::INFINITY),
            act_space: BoxSpace::uniform(config.act_dim, -1.0, 1.0),
        })
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.t = 0;
        Ok(vec![0.0; self.config.obs_dim])
    }

    fn step(&mut self, act: &[f32]) -> Result<Step> {
        if act.len() != self.config.act_dim {
            return Err(MbrlError::ShapeMismatch {
                what: "action of DummyEnv".into(),
                expected: self.config.act_dim,
                actual: act.len(),
            }
            .into());
        }
        self.t += 1;
        let noise = self.config.reward_noise * self.rng.gen::<f32>();
        Ok(Step::new(
            vec![self.t as f32; self.config.obs_dim],
            1.0 + noise,
            self.t >= self.config.episode_len,
        ))
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

/// Call counters of [`DummyAgent`].
#[derive(Debug, Default, Clone)]
pub struct AgentCounters {
    /// Calls of [`Agent::update`].
    pub n_updates: usize,

    /// Calls of [`Agent::select_action`].
    pub n_select_action: usize,

    /// Sizes of the real part of the minibatches.
    pub real_sizes: Vec<usize>,

    /// Sizes of the model part of the minibatches, `0` without a model part.
    pub model_sizes: Vec<usize>,

    /// Directories given to [`Agent::save_params`].
    pub saved: Vec<String>,
}

/// An agent returning zero actions.
pub struct DummyAgent {
    act_dim: usize,
    obs_dim: usize,
    is_train: bool,
    fail_at_update: Option<usize>,
    counters: Rc<RefCell<AgentCounters>>,
}

impl DummyAgent {
    /// Constructs an agent.
    pub fn new(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs_dim,
            act_dim,
            is_train: true,
            fail_at_update: None,
            counters: Rc::new(RefCell::new(AgentCounters::default())),
        }
    }

    /// Makes the `n`-th update (starting from 1) fail.
    pub fn fail_at_update(mut self, n: usize) -> Self {
        self.fail_at_update = Some(n);
        self
    }

    /// Returns the shared counters.
    pub fn counters(&self) -> Rc<RefCell<AgentCounters>> {
        self.counters.clone()
    }
}

impl Agent for DummyAgent {
    fn train(&mut self) {
        self.is_train = true;
    }

    fn eval(&mut self) {
        self.is_train = false;
    }

    fn is_train(&self) -> bool {
        self.is_train
    }

    fn select_action(&mut self, obs: &Array2<f32>) -> Result<Array2<f32>> {
        if obs.ncols() != self.obs_dim {
            return Err(MbrlError::ShapeMismatch {
                what: "observation of DummyAgent".into(),
                expected: self.obs_dim,
                actual: obs.ncols(),
            }
            .into());
        }
        self.counters.borrow_mut().n_select_action += 1;
        Ok(Array2::zeros((obs.nrows(), self.act_dim)))
    }

    fn update(&mut self, batch: MixedBatch) -> Result<Record> {
        let mut c = self.counters.borrow_mut();
        c.n_updates += 1;
        if Some(c.n_updates) == self.fail_at_update {
            anyhow::bail!("update {} failed", c.n_updates);
        }
        c.real_sizes.push(batch.real.len());
        c.model_sizes.push(batch.model.as_ref().map_or(0, |b| b.len()));
        Ok(Record::from_scalar("loss", 1.0 / c.n_updates as f32))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        fs::write(path.join("dummy_agent.txt"), "dummy")?;
        self.counters
            .borrow_mut()
            .saved
            .push(path.to_string_lossy().to_string());
        Ok(())
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        fs::read_to_string(path.join("dummy_agent.txt"))?;
        Ok(())
    }
}

/// Call counters of [`DummyDynamics`].
#[derive(Debug, Default, Clone)]
pub struct DynamicsCounters {
    /// Calls of [`DynamicsModel::fit`].
    pub n_fit: usize,

    /// Calls of [`DynamicsPredictor::predict`].
    pub n_predict: usize,
}

/// A model predicting `s + 1` with unit reward.
///
/// A transition is terminal if the first component of the next state reaches
/// the done threshold.
pub struct DummyDynamics {
    obs_dim: usize,
    done_threshold: Option<f32>,
    counters: Rc<RefCell<DynamicsCounters>>,
}

impl DummyDynamics {
    /// Constructs a model without termination.
    pub fn new(obs_dim: usize) -> Self {
        Self {
            obs_dim,
            done_threshold: None,
            counters: Rc::new(RefCell::new(DynamicsCounters::default())),
        }
    }

    /// Sets the done threshold.
    pub fn done_threshold(mut self, v: f32) -> Self {
        self.done_threshold = Some(v);
        self
    }

    /// Returns the shared counters.
    pub fn counters(&self) -> Rc<RefCell<DynamicsCounters>> {
        self.counters.clone()
    }
}

impl DynamicsPredictor for DummyDynamics {
    fn predict(&mut self, obs: &Array2<f32>, _act: &Array2<f32>) -> Result<Prediction> {
        if obs.ncols() != self.obs_dim {
            return Err(MbrlError::ShapeMismatch {
                what: "observation of DummyDynamics".into(),
                expected: self.obs_dim,
                actual: obs.ncols(),
            }
            .into());
        }
        self.counters.borrow_mut().n_predict += 1;
        let next_obs = obs + 1.0;
        let is_done = next_obs
            .rows()
            .into_iter()
            .map(|r| self.done_threshold.map_or(false, |th| r[0] >= th))
            .collect();
        Ok(Prediction {
            reward: vec![1.0; obs.nrows()],
            next_obs,
            is_done,
        })
    }
}

impl DynamicsModel for DummyDynamics {
    fn fit(&mut self, pool: &mut TransitionPool) -> Result<Record> {
        self.counters.borrow_mut().n_fit += 1;
        Ok(Record::from_slice(&[
            ("model_loss", Scalar(0.0)),
            ("model_fit_size", Scalar(pool.len() as f32)),
        ]))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        fs::write(path.join("dummy_dynamics.txt"), "dummy")?;
        Ok(())
    }

    fn load_params(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
