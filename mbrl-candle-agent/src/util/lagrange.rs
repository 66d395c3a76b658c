use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use std::path::Path;

const MAX_MULTIPLIER: f64 = 1e6;

/// Lagrange multiplier of the constraint `gap <= threshold`.
///
/// The multiplier grows while the constraint is violated and shrinks towards
/// zero otherwise.
pub struct LagrangeMultiplier {
    varmap: VarMap,
    log_alpha: Tensor,
    threshold: f64,
    opt: Optimizer,
}

impl LagrangeMultiplier {
    /// Constructs a multiplier starting at one.
    pub fn new(threshold: f64, learning_rate: f64, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let log_alpha = vb.get_with_hints(1, "log_alpha_prime", Init::Const(0.0))?;
        let opt = OptimizerConfig::default()
            .learning_rate(learning_rate)
            .build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            log_alpha,
            threshold,
            opt,
        })
    }

    /// The threshold of the constraint.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn alpha_with_grad(&self) -> Result<Tensor> {
        Ok(self.log_alpha.exp()?.clamp(0.0, MAX_MULTIPLIER)?)
    }

    /// The multiplier, `[1]`, without gradient.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.alpha_with_grad()?.detach())
    }

    /// Gradient step on `-alpha * (gap - threshold)`.
    pub fn update(&mut self, gap: &Tensor) -> Result<()> {
        let slack = gap.detach().affine(1.0, -self.threshold)?;
        let loss = self
            .alpha_with_grad()?
            .broadcast_mul(&slack)?
            .mean_all()?
            .affine(-1.0, 0.0)?;
        self.opt.backward_step(&loss)
    }

    /// Saves the parameter.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path.as_ref())?;
        info!("Save Lagrange multiplier to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameter.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::to_scalar;

    #[test]
    fn test_multiplier_follows_violation() -> Result<()> {
        let mut lagrange = LagrangeMultiplier::new(1.0, 0.1, &Device::Cpu)?;
        assert!((to_scalar(&lagrange.alpha()?)? - 1.0).abs() < 1e-6);

        let violated = Tensor::new(5f32, &Device::Cpu)?;
        lagrange.update(&violated)?;
        let a1 = to_scalar(&lagrange.alpha()?)?;
        assert!(a1 > 1.0);

        let satisfied = Tensor::new(-5f32, &Device::Cpu)?;
        lagrange.update(&satisfied)?;
        lagrange.update(&satisfied)?;
        assert!(to_scalar(&lagrange.alpha()?)? < a1);
        Ok(())
    }
}
