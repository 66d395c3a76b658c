//! Offline datasets.
use crate::{Env, MbrlError, Transition, TransitionPool, TransitionPoolConfig};
use anyhow::Result;
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// A set of transitions stored as five parallel sequences.
///
/// Files with the extension `json` are read and written with `serde_json`,
/// any other file with `bincode`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Dataset {
    /// States.
    pub observations: Vec<Vec<f32>>,

    /// Actions.
    pub actions: Vec<Vec<f32>>,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Next states.
    pub next_observations: Vec<Vec<f32>>,

    /// Termination flags.
    pub terminals: Vec<bool>,
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |e| e == "json")
}

impl Dataset {
    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the dataset has no transition.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Dimension of states, `None` for an empty dataset.
    pub fn obs_dim(&self) -> Option<usize> {
        self.observations.first().map(|o| o.len())
    }

    /// Dimension of actions, `None` for an empty dataset.
    pub fn act_dim(&self) -> Option<usize> {
        self.actions.first().map(|a| a.len())
    }

    /// Checks that the sequences have the same length and consistent dimensions.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        for (name, len) in [
            ("observations", self.observations.len()),
            ("actions", self.actions.len()),
            ("next_observations", self.next_observations.len()),
            ("terminals", self.terminals.len()),
        ] {
            if len != n {
                return Err(MbrlError::Dataset(format!(
                    "{} has {} entries while rewards has {}",
                    name, len, n
                ))
                .into());
            }
        }

        let (obs_dim, act_dim) = match (self.obs_dim(), self.act_dim()) {
            (Some(o), Some(a)) => (o, a),
            _ => return Ok(()),
        };
        for i in 0..n {
            if self.observations[i].len() != obs_dim
                || self.next_observations[i].len() != obs_dim
                || self.actions[i].len() != act_dim
            {
                return Err(MbrlError::Dataset(format!("inconsistent dimensions at entry {}", i)).into());
            }
        }
        Ok(())
    }

    /// Returns the `i`-th transition.
    pub fn get(&self, i: usize) -> Option<Transition> {
        if i >= self.len() {
            return None;
        }
        Some(Transition::new(
            self.observations[i].clone(),
            self.actions[i].clone(),
            self.rewards[i],
            self.next_observations[i].clone(),
            self.terminals[i],
        ))
    }

    /// Appends a transition.
    pub fn push(&mut self, tr: Transition) {
        self.observations.push(tr.obs().to_vec());
        self.actions.push(tr.act().to_vec());
        self.rewards.push(tr.reward());
        self.next_observations.push(tr.next_obs().to_vec());
        self.terminals.push(tr.is_done());
    }

    /// Pushes every transition into `pool` in order.
    pub fn push_into(&self, pool: &mut TransitionPool) -> Result<()> {
        self.validate()?;
        for i in 0..self.len() {
            if let Some(tr) = self.get(i) {
                pool.push(tr)?;
            }
        }
        info!("Loaded {} transitions into the {} pool", self.len(), pool.name());
        Ok(())
    }

    /// Builds a pool holding exactly the transitions of the dataset.
    ///
    /// The capacity of `config` is replaced with the size of the dataset.
    pub fn to_pool(&self, config: &TransitionPoolConfig) -> Result<TransitionPool> {
        if self.is_empty() {
            return Err(MbrlError::Dataset("the dataset has no transition".to_string()).into());
        }
        let config = config.clone().capacity(self.len());
        let mut pool = TransitionPool::build(&config)?;
        self.push_into(&mut pool)?;
        Ok(pool)
    }

    /// Collects `n` transitions with a uniformly random policy.
    pub fn collect<E: Env>(env: &mut E, n: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dataset = Self::default();
        env.seed(seed);
        let mut obs = env.reset()?;

        for _ in 0..n {
            let act = env.action_space().sample(&mut rng);
            let step = env.step(&act)?;
            let next_obs = step.obs;
            dataset.push(Transition::new(
                obs,
                act,
                step.reward,
                next_obs.clone(),
                step.is_terminated,
            ));
            obs = match step.is_terminated {
                true => env.reset()?,
                false => next_obs,
            };
        }

        Ok(dataset)
    }

    /// Loads a dataset and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rdr = BufReader::new(File::open(path)?);
        let dataset: Self = match is_json(path) {
            true => serde_json::from_reader(rdr)?,
            false => bincode::deserialize_from(rdr)?,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Saves the dataset.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let wtr = BufWriter::new(File::create(path)?);
        match is_json(path) {
            true => serde_json::to_writer(wtr, self)?,
            false => bincode::serialize_into(wtr, self)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyEnv, DummyEnvConfig};
    use tempdir::TempDir;

    fn collect(n: usize) -> Dataset {
        let config = DummyEnvConfig::default().episode_len(4).dims(2, 3);
        let mut env = DummyEnv::build(&config, 0).unwrap();
        Dataset::collect(&mut env, n, 1).unwrap()
    }

    #[test]
    fn test_collect() {
        let dataset = collect(10);
        assert_eq!(dataset.len(), 10);
        assert_eq!(dataset.obs_dim(), Some(2));
        assert_eq!(dataset.act_dim(), Some(3));
        assert!(dataset.validate().is_ok());

        // Episodes of 4 steps
        let n_done = dataset.terminals.iter().filter(|&&d| d).count();
        assert_eq!(n_done, 2);
        assert_eq!(dataset.observations[4], vec![0.0, 0.0]);
        assert!(dataset.actions.iter().flatten().all(|a| (-1.0..=1.0).contains(a)));
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dataset = collect(6);
        let dir = TempDir::new("dataset")?;
        for name in ["dataset.json", "dataset.bin"] {
            let path = dir.path().join(name);
            dataset.save(&path)?;
            assert_eq!(dataset, Dataset::load(&path)?);
        }
        Ok(())
    }

    #[test]
    fn test_validate_lengths() {
        let mut dataset = collect(3);
        dataset.terminals.pop();
        let err = dataset.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MbrlError>(),
            Some(MbrlError::Dataset(_))
        ));
    }

    #[test]
    fn test_push_into_pool() -> Result<()> {
        let dataset = collect(8);
        let config = TransitionPoolConfig::default().capacity(5).dims(2, 3);
        let mut pool = TransitionPool::build(&config)?;
        dataset.push_into(&mut pool)?;
        assert_eq!(pool.len(), 5);
        Ok(())
    }

    #[test]
    fn test_to_pool_sized_by_dataset() -> Result<()> {
        let dataset = collect(8);
        let config = TransitionPoolConfig::default().capacity(1).dims(2, 3);
        let pool = dataset.to_pool(&config)?;
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.len(), 8);
        Ok(())
    }

    #[test]
    fn test_to_pool_empty_dataset() {
        let config = TransitionPoolConfig::default().dims(2, 3);
        let res = Dataset::default().to_pool(&config);
        assert!(matches!(
            res.err().as_ref().and_then(|e| e.downcast_ref::<MbrlError>()),
            Some(MbrlError::Dataset(_))
        ));
    }
}
