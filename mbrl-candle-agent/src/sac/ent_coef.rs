//! Entropy coefficient of SAC.
use crate::{
    opt::{Optimizer, OptimizerConfig},
    util::to_scalar,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),
    /// Automatic tuning given `(target_entropy, learning_rate)`.
    Auto(f64, f64),
}

/// The entropy coefficient of SAC.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None, None)
            }
            EntCoefMode::Auto(target_entropy, learning_rate) => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::default()
                    .learning_rate(learning_rate)
                    .build(varmap.all_vars())?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient, `[1]`.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn alpha_value(&self) -> Result<f32> {
        to_scalar(&self.alpha()?)
    }

    /// Updates the parameter given log probabilities of sampled actions.
    ///
    /// Does nothing for a fixed coefficient.
    pub fn update(&mut self, logp: &Tensor) -> Result<()> {
        if let (Some(target_entropy), Some(opt)) = (self.target_entropy, &mut self.opt) {
            let err = logp.detach().affine(1.0, target_entropy)?;
            let loss = self
                .log_alpha
                .broadcast_mul(&err)?
                .mean_all()?
                .affine(-1.0, 0.0)?;
            opt.backward_step(&loss)?;
        }
        Ok(())
    }

    /// Save the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_coefficient() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), &Device::Cpu)?;
        let logp = Tensor::from_slice(&[-1f32, 3.0], (2,), &Device::Cpu)?;
        ent_coef.update(&logp)?;
        assert!((ent_coef.alpha_value()? - 0.2).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_auto_tuning_direction() -> Result<()> {
        // Entropy below the target (logp > -target) increases alpha
        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(-1.0, 0.01), &Device::Cpu)?;
        let logp = Tensor::from_slice(&[3f32, 3.0], (2,), &Device::Cpu)?;
        ent_coef.update(&logp)?;
        assert!(ent_coef.alpha_value()? > 1.0);
        Ok(())
    }
}
