//! Fixed-capacity ring buffer of transitions.
mod config;
use crate::{MbrlError, Transition, TransitionBatch};
use anyhow::Result;
pub use config::TransitionPoolConfig;
use ndarray::{s, Array2, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A fixed-capacity pool of transitions with ring-buffer eviction.
///
/// Storage is allocated once in [`TransitionPool::build`]. A write cursor walks
/// the slots modulo the capacity, so once the pool is full every push overwrites
/// the oldest transition. Eviction depends only on the write position, never on
/// how often a transition was sampled.
///
/// The same type backs the real pool (dataset or environment transitions) and the
/// model pool (transitions synthesized by the dynamics model).
///
/// The pool has no interior locking. Producers and consumers running on different
/// threads must wrap it in a `RwLock` since eviction overwrites slots in place.
pub struct TransitionPool {
    name: String,
    capacity: usize,
    obs_dim: usize,
    act_dim: usize,

    // Write cursor, always in `0..capacity`
    i: usize,

    // Number of stored transitions, never larger than `capacity`
    size: usize,

    obs: Array2<f32>,
    act: Array2<f32>,
    next_obs: Array2<f32>,
    reward: Vec<f32>,
    is_done: Vec<i8>,
    rng: StdRng,
}

impl TransitionPool {
    /// Allocates a pool.
    pub fn build(config: &TransitionPoolConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(MbrlError::Configuration(format!(
                "capacity of the {} pool must be positive",
                config.name
            ))
            .into());
        }
        let capacity = config.capacity;

        Ok(Self {
            name: config.name.clone(),
            capacity,
            obs_dim: config.obs_dim,
            act_dim: config.act_dim,
            i: 0,
            size: 0,
            obs: Array2::zeros((capacity, config.obs_dim)),
            act: Array2::zeros((capacity, config.act_dim)),
            next_obs: Array2::zeros((capacity, config.obs_dim)),
            reward: vec![0.; capacity],
            is_done: vec![0; capacity],
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Name of the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The maximum number of transitions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The current number of transitions, at most [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the pool holds no transition.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Dimension of states.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Dimension of actions.
    pub fn act_dim(&self) -> usize {
        self.act_dim
    }

    fn check_dim(&self, what: &str, expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(MbrlError::ShapeMismatch {
                what: format!("{} of the {} pool", what, self.name),
                expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    #[inline]
    fn advance(&mut self) {
        self.i = (self.i + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
    }

    /// Appends a transition, evicting the oldest one if the pool is full.
    pub fn push(&mut self, tr: Transition) -> Result<()> {
        self.check_dim("obs", self.obs_dim, tr.obs().len())?;
        self.check_dim("act", self.act_dim, tr.act().len())?;
        self.check_dim("next_obs", self.obs_dim, tr.next_obs().len())?;

        let i = self.i;
        self.obs.row_mut(i).iter_mut().zip(tr.obs()).for_each(|(d, s)| *d = *s);
        self.act.row_mut(i).iter_mut().zip(tr.act()).for_each(|(d, s)| *d = *s);
        self.next_obs
            .row_mut(i)
            .iter_mut()
            .zip(tr.next_obs())
            .for_each(|(d, s)| *d = *s);
        self.reward[i] = tr.reward();
        self.is_done[i] = tr.is_done() as i8;
        self.advance();

        Ok(())
    }

    /// Appends every transition of a batch in row order.
    pub fn push_batch(&mut self, batch: &TransitionBatch) -> Result<()> {
        self.check_dim("obs", self.obs_dim, batch.obs.ncols())?;
        self.check_dim("act", self.act_dim, batch.act.ncols())?;
        self.check_dim("next_obs", self.obs_dim, batch.next_obs.ncols())?;

        // Rows of every field must match the number of rewards
        let n = batch.len();
        self.check_dim("rows of obs", n, batch.obs.nrows())?;
        self.check_dim("rows of act", n, batch.act.nrows())?;
        self.check_dim("rows of next_obs", n, batch.next_obs.nrows())?;
        self.check_dim("rows of is_done", n, batch.is_done.len())?;

        for j in 0..n {
            let i = self.i;
            self.obs.row_mut(i).assign(&batch.obs.row(j));
            self.act.row_mut(i).assign(&batch.act.row(j));
            self.next_obs.row_mut(i).assign(&batch.next_obs.row(j));
            self.reward[i] = batch.reward[j];
            self.is_done[i] = batch.is_done[j];
            self.advance();
        }

        Ok(())
    }

    fn sample_ixs(&mut self, n: usize) -> Result<Vec<usize>> {
        if n > 0 && self.size == 0 {
            return Err(MbrlError::EmptyPool {
                pool: self.name.clone(),
                requested: n,
            }
            .into());
        }
        let size = self.size;
        Ok((0..n).map(|_| self.rng.gen_range(0..size)).collect())
    }

    /// Draws `n` transitions uniformly at random with replacement.
    ///
    /// `sample(0)` returns an empty batch, even on an empty pool. Any other
    /// request on an empty pool fails with [`MbrlError::EmptyPool`].
    pub fn sample(&mut self, n: usize) -> Result<TransitionBatch> {
        let ixs = self.sample_ixs(n)?;

        Ok(TransitionBatch {
            obs: self.obs.select(Axis(0), &ixs),
            act: self.act.select(Axis(0), &ixs),
            next_obs: self.next_obs.select(Axis(0), &ixs),
            reward: ixs.iter().map(|&ix| self.reward[ix]).collect(),
            is_done: ixs.iter().map(|&ix| self.is_done[ix]).collect(),
        })
    }

    /// Draws `n` states uniformly at random with replacement.
    ///
    /// Used to seed model rollouts, which need nothing but the state.
    pub fn sample_obs(&mut self, n: usize) -> Result<Array2<f32>> {
        let ixs = self.sample_ixs(n)?;
        Ok(self.obs.select(Axis(0), &ixs))
    }

    /// Returns the transition stored in `slot`, if the slot has been written.
    pub fn get(&self, slot: usize) -> Option<Transition> {
        if slot >= self.size {
            return None;
        }
        Some(Transition::new(
            self.obs.row(slot).to_vec(),
            self.act.row(slot).to_vec(),
            self.reward[slot],
            self.next_obs.row(slot).to_vec(),
            self.is_done[slot] == 1,
        ))
    }

    /// Iterates over the stored transitions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = Transition> + '_ {
        (0..self.size).filter_map(move |slot| self.get(slot))
    }

    /// Returns a view of the stored states.
    pub fn obs_view(&self) -> ArrayView2<f32> {
        self.obs.slice(s![..self.size, ..])
    }

    /// Returns a view of the stored actions.
    pub fn act_view(&self) -> ArrayView2<f32> {
        self.act.slice(s![..self.size, ..])
    }
}
