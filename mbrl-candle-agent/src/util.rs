//! Utilities.
pub mod actor;
mod conservative;
pub mod critic;
mod lagrange;
mod quantile_loss;
mod risk;
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarMap;
pub use conservative::{conservative_gaps, ConservativePenalty};
pub use lagrange::LagrangeMultiplier;
use log::trace;
use ndarray::Array2;
pub use quantile_loss::{quantile_huber_loss, quantile_midpoints};
pub use risk::RiskType;
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub enum CriticLoss {
    /// Mean squared error.
    #[default]
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

impl CriticLoss {
    /// Returns the loss between predictions and targets.
    pub fn loss(&self, pred: &Tensor, tgt: &Tensor) -> Result<Tensor> {
        Ok(match self {
            Self::Mse => candle_nn::loss::mse(pred, tgt)?,
            Self::SmoothL1 => smooth_l1_loss(pred, tgt)?,
        })
    }
}

fn lock(varmap: &VarMap) -> Result<MutexGuard<'_, std::collections::HashMap<String, candle_core::Var>>> {
    varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variables are locked by a panicked thread"))
}

/// Apply soft update on variables, `dest = tau * src + (1.0 - tau) * dest`.
///
/// The name of a source variable is the name of the destination with
/// `ss_dest` replaced by `ss_src`.
pub fn track_with_replace_substring(
    dest: &VarMap,
    src: &VarMap,
    tau: f64,
    (ss_src, ss_dest): (&str, &str),
) -> Result<()> {
    trace!("dest");
    let dest = lock(dest)?;
    trace!("src");
    let src = lock(src)?;

    for (k_dest, v_dest) in dest.iter() {
        let k_src = match ss_dest.is_empty() {
            true => k_dest.clone(),
            false => k_dest.replace(ss_dest, ss_src),
        };
        let v_src = src
            .get(&k_src)
            .ok_or_else(|| anyhow!("no source variable {}", k_src))?;
        let t_src = v_src.as_tensor().affine(tau, 0.0)?;
        let t_dest = v_dest.as_tensor().affine(1.0 - tau, 0.0)?;
        v_dest.set(&(t_src + t_dest)?)?;
    }

    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = m1.affine(-1.0, 1.0)?;
    let quad = (m1 * d.sqr()?.affine(0.5, 0.0)?)?;
    let lin = (m2 * d.affine(1.0, -0.5)?)?;
    (quad + lin)?.mean_all()
}

/// `log(sum(exp(x)))` along `dim`, which is removed.
pub fn log_sum_exp(x: &Tensor, dim: usize) -> Result<Tensor> {
    let m = x.max_keepdim(dim)?;
    let s = x.broadcast_sub(&m)?.exp()?.sum_keepdim(dim)?.log()?;
    Ok((s + m)?.squeeze(dim)?)
}

/// `[n, d]` matrix to a tensor of the same shape.
pub fn array2_to_tensor(a: &Array2<f32>, device: &Device) -> Result<Tensor> {
    let v = a.iter().copied().collect::<Vec<_>>();
    Ok(Tensor::from_vec(v, a.dim(), device)?)
}

/// `[n, d]` tensor to a matrix of the same shape.
pub fn tensor_to_array2(t: &Tensor) -> Result<Array2<f32>> {
    let (n, d) = t.dims2()?;
    let v = t.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    Ok(Array2::from_shape_vec((n, d), v)?)
}

/// Vector to a 1-dimensional tensor.
pub fn vec_to_tensor(v: &[f32], device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(v, (v.len(),), device)?)
}

/// Returns the scalar of a single-element tensor.
pub fn to_scalar(t: &Tensor) -> Result<f32> {
    Ok(t.flatten_all()?.to_vec1::<f32>()?[0])
}

/// Mean along the last dimension, which is removed.
///
/// For critics with a single output this is the action value, for quantile
/// critics the mean of the quantiles.
pub fn mean_value(t: &Tensor) -> Result<Tensor> {
    Ok(t.mean(D::Minus1)?)
}
