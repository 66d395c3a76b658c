use anyhow::Result;
use mbrl_core::{BoxSpace, Env, MbrlError, Step};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration of [`FlowMerge`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowMergeConfig {
    /// Dimension of observations.
    pub obs_dim: usize,

    /// Dimension of actions.
    pub act_dim: usize,

    /// Steps in an episode.
    pub max_steps: usize,

    /// Standard deviation of the random walk of the state.
    pub noise_std: f32,
}

impl Default for FlowMergeConfig {
    fn default() -> Self {
        Self {
            obs_dim: 25,
            act_dim: 5,
            max_steps: 1000,
            noise_std: 0.01,
        }
    }
}

/// Stand-in for a traffic merge scenario.
///
/// The state starts at zero and follows a Gaussian random walk independent of
/// the actions. The reward is `1` on every step but the last, where it is `-1`.
pub struct FlowMerge {
    config: FlowMergeConfig,
    state: Vec<f32>,
    t: usize,
    noise: Normal<f32>,
    rng: StdRng,
    obs_space: BoxSpace,
    act_space: BoxSpace,
}

impl Env for FlowMerge {
    type Config = FlowMergeConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| MbrlError::Configuration(format!("noise_std of FlowMerge: {}", e)))?;
        Ok(Self {
            state: vec![0.0; config.obs_dim],
            t: 0,
            noise,
            rng: StdRng::seed_from_u64(seed as u64),
            obs_space: BoxSpace::uniform(config.obs_dim, f32::NEG_INFINITY, f32::INFINITY),
            act_space: BoxSpace::uniform(config.act_dim, -1.0, 1.0),
            config: config.clone(),
        })
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.t = 0;
        self.state = vec![0.0; self.config.obs_dim];
        Ok(self.state.clone())
    }

    fn step(&mut self, act: &[f32]) -> Result<Step> {
        if act.len() != self.config.act_dim {
            return Err(MbrlError::ShapeMismatch {
                what: "action of FlowMerge".into(),
                expected: self.config.act_dim,
                actual: act.len(),
            }
            .into());
        }

        self.t += 1;
        for x in self.state.iter_mut() {
            *x += self.noise.sample(&mut self.rng);
        }
        let is_terminated = self.t >= self.config.max_steps;
        let reward = if is_terminated { -1.0 } else { 1.0 };

        Ok(Step::new(self.state.clone(), reward, is_terminated))
    }

    fn observation_space(&self) -> &BoxSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode() -> Result<()> {
        let config = FlowMergeConfig {
            max_steps: 3,
            ..Default::default()
        };
        let mut env = FlowMerge::build(&config, 0)?;
        assert_eq!(env.reset()?, vec![0.0; 25]);

        let act = vec![0.0; 5];
        let rewards = (0..3)
            .map(|_| env.step(&act))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(
            rewards.iter().map(|s| s.reward).collect::<Vec<_>>(),
            vec![1.0, 1.0, -1.0]
        );
        assert!(!rewards[1].is_terminated);
        assert!(rewards[2].is_terminated);
        assert!(rewards[2].obs.iter().all(|x| x.abs() < 0.2));
        Ok(())
    }

    #[test]
    fn test_wrong_action() -> Result<()> {
        let mut env = FlowMerge::build(&FlowMergeConfig::default(), 0)?;
        env.reset()?;
        assert!(env.step(&[0.0; 2]).is_err());
        Ok(())
    }
}
