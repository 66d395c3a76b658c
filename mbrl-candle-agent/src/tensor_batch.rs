use crate::util::{array2_to_tensor, vec_to_tensor};
use anyhow::Result;
use candle_core::{Device, Tensor};
use mbrl_core::MixedBatch;

/// A minibatch of transitions on a candle device.
///
/// The first `n_real` rows come from the real pool, the rest from the model pool.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    /// States, `[batch_size, obs_dim]`.
    pub obs: Tensor,

    /// Actions, `[batch_size, act_dim]`.
    pub act: Tensor,

    /// Next states, `[batch_size, obs_dim]`.
    pub next_obs: Tensor,

    /// Rewards, `[batch_size]`.
    pub reward: Tensor,

    /// `1.0` for terminated transitions, `[batch_size]`.
    pub is_done: Tensor,

    /// The number of real transitions.
    pub n_real: usize,
}

impl TensorBatch {
    /// Moves a [`MixedBatch`] to `device`, real transitions first.
    pub fn from_mixed(batch: MixedBatch, device: &Device) -> Result<Self> {
        let n_real = batch.real.len();
        let (obs, act, next_obs, reward, is_done) = batch.into_batch()?.unpack();
        let is_done = is_done.iter().map(|&d| d as f32).collect::<Vec<_>>();

        Ok(Self {
            obs: array2_to_tensor(&obs, device)?,
            act: array2_to_tensor(&act, device)?,
            next_obs: array2_to_tensor(&next_obs, device)?,
            reward: vec_to_tensor(&reward, device)?,
            is_done: vec_to_tensor(&is_done, device)?,
            n_real,
        })
    }

    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.obs.dims()[0]
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of rows whose values are pushed up by conservative critics:
    /// the real rows, or all rows when the batch has no real transition.
    pub fn n_data_rows(&self) -> usize {
        match self.n_real {
            0 => self.len(),
            n => n,
        }
    }

    /// States of model transitions, if any.
    pub fn model_obs(&self) -> Result<Option<Tensor>> {
        let n_model = self.len() - self.n_real;
        Ok(match n_model {
            0 => None,
            n => Some(self.obs.narrow(0, self.n_real, n)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrl_core::TransitionBatch;
    use ndarray::Array2;

    fn batch(tag: f32, n: usize, done: i8) -> TransitionBatch {
        TransitionBatch {
            obs: Array2::from_elem((n, 2), tag),
            act: Array2::from_elem((n, 1), tag),
            next_obs: Array2::from_elem((n, 2), tag + 1.0),
            reward: vec![tag; n],
            is_done: vec![done; n],
        }
    }

    #[test]
    fn test_from_mixed() -> Result<()> {
        let mixed = MixedBatch {
            real: batch(1.0, 2, 0),
            model: Some(batch(5.0, 3, 1)),
            real_ratio: 0.4,
        };
        let b = TensorBatch::from_mixed(mixed, &Device::Cpu)?;
        assert_eq!(b.len(), 5);
        assert_eq!(b.n_real, 2);
        assert_eq!(b.n_data_rows(), 2);
        assert_eq!(b.reward.to_vec1::<f32>()?, vec![1.0, 1.0, 5.0, 5.0, 5.0]);
        assert_eq!(b.is_done.to_vec1::<f32>()?, vec![0.0, 0.0, 1.0, 1.0, 1.0]);

        let model_obs = b.model_obs()?.expect("model part");
        assert_eq!(model_obs.to_vec2::<f32>()?, vec![vec![5.0, 5.0]; 3]);
        Ok(())
    }

    #[test]
    fn test_real_only() -> Result<()> {
        let mixed = MixedBatch {
            real: batch(1.0, 4, 0),
            model: None,
            real_ratio: 1.0,
        };
        let b = TensorBatch::from_mixed(mixed, &Device::Cpu)?;
        assert!(b.model_obs()?.is_none());
        assert_eq!(b.next_obs.dims(), &[4, 2]);
        Ok(())
    }
}
