//! Algorithm tags.
use crate::MbrlError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The kind of critic an algorithm trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum CriticKind {
    /// Twin Q functions with soft Bellman backups.
    ModelFree,

    /// Q functions with a penalty on out-of-distribution actions.
    Conservative,

    /// Quantile critic with a conservative penalty and risk-sensitive actor.
    Distributional,
}

/// Algorithms known to the trainer.
///
/// `Sac`, `Cql` and `Codac` are declared model-free: they train on the real pool
/// alone and must run with `real_ratio == 1.0`. `Mopo`, `Combo` and `Dsac` use the
/// same critics on minibatches mixing real and model transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Soft actor-critic.
    Sac,

    /// Conservative Q-learning.
    Cql,

    /// Conservative offline distributional actor-critic.
    Codac,

    /// Model-based SAC with uncertainty-penalized model rewards.
    Mopo,

    /// Model-based conservative Q-learning.
    Combo,

    /// Model-based distributional conservative actor-critic.
    Dsac,
}

impl Algorithm {
    /// Declared model-free algorithms.
    pub const MODEL_FREE: [Algorithm; 3] = [Algorithm::Sac, Algorithm::Cql, Algorithm::Codac];

    /// Returns `true` for algorithms that never use model rollouts.
    pub fn is_model_free(&self) -> bool {
        Self::MODEL_FREE.contains(self)
    }

    /// Returns the kind of critic trained by the algorithm.
    pub fn critic(&self) -> CriticKind {
        match self {
            Self::Sac | Self::Mopo => CriticKind::ModelFree,
            Self::Cql | Self::Combo => CriticKind::Conservative,
            Self::Codac | Self::Dsac => CriticKind::Distributional,
        }
    }

    /// Lower-case tag of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sac => "sac",
            Self::Cql => "cql",
            Self::Codac => "codac",
            Self::Mopo => "mopo",
            Self::Combo => "combo",
            Self::Dsac => "dsac",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = MbrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sac" => Ok(Self::Sac),
            "cql" => Ok(Self::Cql),
            "codac" => Ok(Self::Codac),
            "mopo" => Ok(Self::Mopo),
            "combo" => Ok(Self::Combo),
            "dsac" => Ok(Self::Dsac),
            _ => Err(MbrlError::Configuration(format!("unknown algorithm: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_free_tags() {
        for algo in ["sac", "cql", "codac"] {
            assert!(algo.parse::<Algorithm>().unwrap().is_model_free());
        }
        for algo in ["mopo", "combo", "dsac"] {
            assert!(!algo.parse::<Algorithm>().unwrap().is_model_free());
        }
        assert!("ppo".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_critic_kind_pairs() {
        assert_eq!(Algorithm::Sac.critic(), Algorithm::Mopo.critic());
        assert_eq!(Algorithm::Cql.critic(), Algorithm::Combo.critic());
        assert_eq!(Algorithm::Codac.critic(), CriticKind::Distributional);
        assert_eq!(Algorithm::Dsac.to_string(), "dsac");
    }
}
