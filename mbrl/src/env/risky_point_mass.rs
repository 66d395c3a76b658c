use anyhow::Result;
use mbrl_core::{
    record::{Record, RecordValue},
    BoxSpace, Env, MbrlError, Step,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration of [`RiskyPointMass`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskyPointMassConfig {
    /// Probability of the penalty on a step in the risky region.
    pub risk_prob: f32,

    /// Penalty in the risky region.
    pub risk_penalty: f32,

    /// Steps in an episode, enforced by the sampler and the evaluator.
    pub horizon: usize,

    /// Initial position.
    pub start: [f32; 2],

    /// Goal position.
    pub goal: [f32; 2],

    /// Distance to the goal at which the episode terminates.
    pub goal_radius: f32,

    /// Center of the risky region.
    pub risk_center: [f32; 2],

    /// Radius of the risky region.
    pub risk_radius: f32,

    /// Largest displacement per step along each axis.
    pub max_step: f32,
}

impl Default for RiskyPointMassConfig {
    fn default() -> Self {
        Self {
            risk_prob: 0.8,
            risk_penalty: 200.0,
            horizon: 100,
            start: [0.0, 0.0],
            goal: [1.0, 1.0],
            goal_radius: 0.1,
            risk_center: [0.5, 0.5],
            risk_radius: 0.3,
            max_step: 0.1,
        }
    }
}

impl RiskyPointMassConfig {
    /// Sets the probability and the size of the penalty.
    pub fn risk(mut self, risk_prob: f32, risk_penalty: f32) -> Self {
        self.risk_prob = risk_prob;
        self.risk_penalty = risk_penalty;
        self
    }
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// A point mass moving on the plane toward a goal.
///
/// The reward of a step is minus the distance to the goal. The straight path
/// from the start crosses a risky region, where each step is penalized by
/// `risk_penalty` with probability `risk_prob`. A risk-neutral policy may cross
/// the region, a risk-averse one goes around it. The episode terminates at the
/// goal; `info` reports `in_risk_region` and `penalized` for every step.
pub struct RiskyPointMass {
    config: RiskyPointMassConfig,
    pos: Vec<f32>,
    rng: StdRng,
    obs_space: BoxSpace,
    act_space: BoxSpace,
}

impl RiskyPointMass {
    /// Returns `true` if `pos` lies in the risky region.
    pub fn in_risk_region(&self, pos: &[f32]) -> bool {
        distance(pos, &self.config.risk_center) <= self.config.risk_radius
    }
}

impl Env for RiskyPointMass {
    type Config = RiskyPointMassConfig;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.risk_prob) {
            return Err(MbrlError::Configuration(format!(
                "risk_prob must be in [0, 1], got {}",
                config.risk_prob
            ))
            .into());
        }
        Ok(Self {
            pos: config.start.to_vec(),
            rng: StdRng::seed_from_u64(seed as u64),
            obs_space: BoxSpace::uniform(2, -2.0, 2.0),
            act_space: BoxSpace::uniform(2, -1.0, 1.0),
            config: config.clone(),
        })
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        self.pos = self.config.start.to_vec();
        Ok(self.pos.clone())
    }

    fn step(&mut self, act: &[f32]) -> Result<Step> {
        if act.len() != 2 {
            return Err(MbrlError::ShapeMismatch {
                what: "action of RiskyPointMass".into(),
                expected: 2,
                actual: act.len(),
            }
            .into());
        }

        let act = self.act_space.clip(act);
        let moved: Vec<f32> = self
            .pos
            .iter()
            .zip(act.iter())
            .map(|(p, a)| p + self.config.max_step * a)
            .collect();
        self.pos = self.obs_space.clip(&moved);

        let dist = distance(&self.pos, &self.config.goal);
        let in_risk = self.in_risk_region(&self.pos);
        let penalized = in_risk && self.rng.gen::<f32>() < self.config.risk_prob;
        let mut reward = -dist;
        if penalized {
            reward -= self.config.risk_penalty;
        }

        let mut step = Step::new(self.pos.clone(), reward, dist <= self.config.goal_radius);
        step.info = Record::from_slice(&[
            ("in_risk_region", RecordValue::Scalar(in_risk as i32 as f32)),
            ("penalized", RecordValue::Scalar(penalized as i32 as f32)),
        ]);
        Ok(step)
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
