use anyhow::Result;
use candle_core::{DType, Device, Tensor};

/// Quantile fractions `(2i + 1) / 2n` for `i` in `0..n`.
pub fn quantile_midpoints(n: usize, device: &Device) -> Result<Tensor> {
    let taus = (0..n)
        .map(|i| (2 * i + 1) as f32 / (2 * n) as f32)
        .collect::<Vec<_>>();
    Ok(Tensor::from_vec(taus, (n,), device)?)
}

/// Quantile Huber loss.
///
/// * `pred` - Predicted quantiles, `[batch_size, n]`.
/// * `target` - Samples of the target distribution, `[batch_size, n_tgt]`.
/// * `taus` - Quantile fractions of `pred`, `[n]`.
///
/// The loss of each pair is `|tau - 1{td < 0}| * huber(td) / kappa` with
/// `td = target - pred`. It is averaged over target samples, summed over
/// quantiles and averaged over the batch.
pub fn quantile_huber_loss(
    pred: &Tensor,
    target: &Tensor,
    taus: &Tensor,
    kappa: f64,
) -> Result<Tensor> {
    let n = pred.dim(1)?;
    debug_assert_eq!(taus.dims(), &[n]);

    // [batch_size, n, n_tgt]
    let td = target.unsqueeze(1)?.broadcast_sub(&pred.unsqueeze(2)?)?;
    let abs = td.abs()?;
    let huber = {
        let small = abs.le(kappa)?.to_dtype(DType::F32)?;
        let large = small.affine(-1.0, 1.0)?;
        let quad = (small * td.sqr()?.affine(0.5, 0.0)?)?;
        let lin = (large * abs.affine(kappa, -0.5 * kappa * kappa)?)?;
        (quad + lin)?
    };
    let below = td.lt(0.0)?.to_dtype(DType::F32)?;
    let weight = taus.reshape((1, n, 1))?.broadcast_sub(&below)?.abs()?;
    let loss = (weight * huber)?.affine(1.0 / kappa, 0.0)?;

    Ok(loss.mean(2)?.sum(1)?.mean_all()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::to_scalar;

    #[test]
    fn test_midpoints() -> Result<()> {
        let taus = quantile_midpoints(4, &Device::Cpu)?.to_vec1::<f32>()?;
        assert_eq!(taus, vec![0.125, 0.375, 0.625, 0.875]);
        Ok(())
    }

    #[test]
    fn test_zero_when_distributions_coincide() -> Result<()> {
        let pred = Tensor::full(2f32, (3, 4), &Device::Cpu)?;
        let target = Tensor::full(2f32, (3, 5), &Device::Cpu)?;
        let taus = quantile_midpoints(4, &Device::Cpu)?;
        let loss = to_scalar(&quantile_huber_loss(&pred, &target, &taus, 1.0)?)?;
        assert!(loss.abs() < 1e-7);
        Ok(())
    }

    #[test]
    fn test_asymmetric_weights() -> Result<()> {
        // A single quantile at tau = 0.25, targets above and below by 0.5
        let taus = Tensor::from_slice(&[0.25f32], (1,), &Device::Cpu)?;
        let pred = Tensor::zeros((1, 1), DType::F32, &Device::Cpu)?;
        let above = Tensor::full(0.5f32, (1, 1), &Device::Cpu)?;
        let below = Tensor::full(-0.5f32, (1, 1), &Device::Cpu)?;

        // huber(0.5) = 0.125
        let l_above = to_scalar(&quantile_huber_loss(&pred, &above, &taus, 1.0)?)?;
        let l_below = to_scalar(&quantile_huber_loss(&pred, &below, &taus, 1.0)?)?;
        assert!((l_above - 0.25 * 0.125).abs() < 1e-6);
        assert!((l_below - 0.75 * 0.125).abs() < 1e-6);

        // Linear part beyond kappa
        let far = Tensor::full(3f32, (1, 1), &Device::Cpu)?;
        let l_far = to_scalar(&quantile_huber_loss(&pred, &far, &taus, 1.0)?)?;
        assert!((l_far - 0.25 * 2.5).abs() < 1e-6);
        Ok(())
    }
}
