//! Transitions and batches of transitions.
use anyhow::Result;
use ndarray::{concatenate, Array2, ArrayView1, Axis};

/// A transition `(s_t, a_t, r_t, s_t+1, done_t)`.
///
/// Produced by the real environment, an offline dataset or the
/// [`RolloutGenerator`](crate::RolloutGenerator). Fields cannot be modified once
/// the transition is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    obs: Vec<f32>,
    act: Vec<f32>,
    reward: f32,
    next_obs: Vec<f32>,
    is_done: bool,
}

impl Transition {
    /// Constructs a transition.
    pub fn new(obs: Vec<f32>, act: Vec<f32>, reward: f32, next_obs: Vec<f32>, is_done: bool) -> Self {
        Self {
            obs,
            act,
            reward,
            next_obs,
            is_done,
        }
    }

    /// State `s_t`.
    pub fn obs(&self) -> &[f32] {
        &self.obs
    }

    /// Action `a_t`.
    pub fn act(&self) -> &[f32] {
        &self.act
    }

    /// Reward `r_t`.
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Next state `s_t+1`.
    pub fn next_obs(&self) -> &[f32] {
        &self.next_obs
    }

    /// Termination flag.
    pub fn is_done(&self) -> bool {
        self.is_done
    }
}

/// A batch of transitions laid out as row-major matrices.
///
/// Row `i` of every field belongs to the same transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    /// States, `[batch_size, obs_dim]`.
    pub obs: Array2<f32>,

    /// Actions, `[batch_size, act_dim]`.
    pub act: Array2<f32>,

    /// Next states, `[batch_size, obs_dim]`.
    pub next_obs: Array2<f32>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Termination flags, `1` for terminated.
    pub is_done: Vec<i8>,
}

impl TransitionBatch {
    /// Returns a batch without any transition.
    pub fn empty(obs_dim: usize, act_dim: usize) -> Self {
        Self {
            obs: Array2::zeros((0, obs_dim)),
            act: Array2::zeros((0, act_dim)),
            next_obs: Array2::zeros((0, obs_dim)),
            reward: vec![],
            is_done: vec![],
        }
    }

    /// Returns the number of transitions.
    pub fn len(&self) -> usize {
        self.reward.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.reward.is_empty()
    }

    /// Returns the `i`-th transition.
    pub fn get(&self, i: usize) -> Transition {
        let to_vec = |v: ArrayView1<f32>| v.iter().copied().collect::<Vec<_>>();
        Transition::new(
            to_vec(self.obs.row(i)),
            to_vec(self.act.row(i)),
            self.reward[i],
            to_vec(self.next_obs.row(i)),
            self.is_done[i] == 1,
        )
    }

    /// Stacks `self` on top of `other`.
    pub fn concat(&self, other: &TransitionBatch) -> Result<Self> {
        Ok(Self {
            obs: concatenate(Axis(0), &[self.obs.view(), other.obs.view()])?,
            act: concatenate(Axis(0), &[self.act.view(), other.act.view()])?,
            next_obs: concatenate(Axis(0), &[self.next_obs.view(), other.next_obs.view()])?,
            reward: self.reward.iter().chain(other.reward.iter()).copied().collect(),
            is_done: self.is_done.iter().chain(other.is_done.iter()).copied().collect(),
        })
    }

    /// Returns the fields `(obs, act, next_obs, reward, is_done)`.
    pub fn unpack(self) -> (Array2<f32>, Array2<f32>, Array2<f32>, Vec<f32>, Vec<i8>) {
        (self.obs, self.act, self.next_obs, self.reward, self.is_done)
    }
}

/// A minibatch mixing real and model-generated transitions.
///
/// `real` has `floor(batch_size * real_ratio)` rows and `model` holds the rest.
/// `model` is `None` when no model transition was requested, which is always
/// the case for model-free algorithms (`real_ratio == 1.0`).
#[derive(Debug, Clone)]
pub struct MixedBatch {
    /// Transitions drawn from the real pool.
    pub real: TransitionBatch,

    /// Transitions drawn from the model pool.
    pub model: Option<TransitionBatch>,

    /// Fraction of the minibatch drawn from the real pool.
    pub real_ratio: f32,
}

impl MixedBatch {
    /// Returns the total number of transitions.
    pub fn len(&self) -> usize {
        self.real.len() + self.model.as_ref().map_or(0, |b| b.len())
    }

    /// Returns `true` if the minibatch has no transition.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates the real and model parts, real transitions first.
    pub fn into_batch(self) -> Result<TransitionBatch> {
        match self.model {
            Some(model) if !model.is_empty() => self.real.concat(&model),
            _ => Ok(self.real),
        }
    }
}
