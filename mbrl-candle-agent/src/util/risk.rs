use anyhow::Result;
use mbrl_core::MbrlError;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_1_SQRT_2;

/// Risk measure applied to a distribution of returns.
///
/// A risk measure is a distortion `g` of quantile fractions. The value of a
/// distribution with quantiles `z_i` at fractions `[i/n, (i+1)/n)` is
/// `sum_i (g((i+1)/n) - g(i/n)) * z_i`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
pub enum RiskType {
    /// The expectation, `g(tau) = tau`.
    #[default]
    Neutral,

    /// Conditional value at risk at level `alpha`, the mean of the lower
    /// `alpha` tail, `g(tau) = min(tau / alpha, 1)`.
    Cvar(f64),

    /// Wang transform, `g(tau) = Phi(Phi^-1(tau) + eta)`. Positive `eta` puts
    /// weight on low returns.
    Wang(f64),
}

impl RiskType {
    /// Parses a risk type given by its name and parameter.
    pub fn from_name(name: &str, param: f64) -> Result<Self> {
        let risk = match name {
            "neutral" => Self::Neutral,
            "cvar" => Self::Cvar(param),
            "wang" => Self::Wang(param),
            _ => {
                return Err(MbrlError::Configuration(format!("unknown risk type {}", name)).into())
            }
        };
        risk.validate()?;
        Ok(risk)
    }

    /// Name used in run names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Cvar(_) => "cvar",
            Self::Wang(_) => "wang",
        }
    }

    /// The parameter, `0` for [`RiskType::Neutral`].
    pub fn param(&self) -> f64 {
        match self {
            Self::Neutral => 0.0,
            Self::Cvar(alpha) => *alpha,
            Self::Wang(eta) => *eta,
        }
    }

    /// Checks the parameter.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Cvar(alpha) if !(*alpha > 0.0 && *alpha <= 1.0) => Err(
                MbrlError::Configuration(format!("cvar level must be in (0, 1], got {}", alpha))
                    .into(),
            ),
            _ => Ok(()),
        }
    }

    /// The distortion of a quantile fraction.
    pub fn distort(&self, tau: f64) -> f64 {
        let tau = tau.clamp(0.0, 1.0);
        match self {
            Self::Neutral => tau,
            Self::Cvar(alpha) => (tau / alpha).min(1.0),
            Self::Wang(eta) => match tau {
                t if t <= 0.0 => 0.0,
                t if t >= 1.0 => 1.0,
                t => normal_cdf(normal_icdf(t) + eta),
            },
        }
    }

    /// Weights of `n` equally spaced quantiles, summing to one.
    pub fn weights(&self, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| {
                let lo = self.distort(i as f64 / n as f64);
                let hi = self.distort((i + 1) as f64 / n as f64);
                (hi - lo) as f32
            })
            .collect()
    }
}

/// Error function, Abramowitz and Stegun 7.1.26.
fn erf(x: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.3275911 * x.abs());
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let y = 1.0 - poly * (-x * x).exp();
    y.copysign(x)
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x * FRAC_1_SQRT_2))
}

/// Inverse of the standard normal CDF, rational approximation of Acklam refined
/// by a Newton step.
fn normal_icdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838,
        -2.549732539343734,
        4.374664141464968,
        2.938163982698783,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996,
        3.754408661907416,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    let x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    let e = normal_cdf(x) - p;
    let u = e * (2.0 * std::f64::consts::PI).sqrt() * (x * x / 2.0).exp();
    x - u / (1.0 + x * u / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(w: &[f32]) -> f32 {
        w.iter().sum()
    }

    #[test]
    fn test_neutral_weights_are_uniform() {
        let w = RiskType::Neutral.weights(4);
        assert!(w.iter().all(|&x| (x - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_cvar_weights() {
        let w = RiskType::Cvar(0.1).weights(10);
        assert!((w[0] - 1.0).abs() < 1e-6);
        assert!(w[1..].iter().all(|&x| x.abs() < 1e-6));

        let w = RiskType::Cvar(0.5).weights(4);
        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[1] - 0.5).abs() < 1e-6);
        assert!((sum(&w) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wang_weights() {
        let w = RiskType::Wang(0.75).weights(8);
        assert!((sum(&w) - 1.0).abs() < 1e-5);
        // Risk averse: weights decrease towards high quantiles
        assert!(w.windows(2).all(|p| p[0] > p[1]));

        let w = RiskType::Wang(0.0).weights(8);
        assert!(w.iter().all(|&x| (x - 0.125).abs() < 1e-5));
    }

    #[test]
    fn test_normal_quantiles() {
        assert!(normal_icdf(0.5).abs() < 1e-7);
        assert!((normal_icdf(0.975) - 1.959964).abs() < 1e-5);
        assert!((normal_icdf(0.01) + 2.326348).abs() < 1e-5);
        assert!((normal_cdf(1.0) - 0.841345).abs() < 1e-6);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(RiskType::from_name("cvar", 0.1).unwrap(), RiskType::Cvar(0.1));
        assert!(RiskType::from_name("cvar", 0.0).is_err());
        assert!(RiskType::from_name("exp", 1.0).is_err());
    }
}
