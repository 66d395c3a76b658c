//! Statistics of evaluation rewards.
use crate::record::{Record, RecordValue};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Fraction of the worst episodes averaged in [`EvalRecord::cvar_10pct`].
pub const CVAR_ALPHA: f32 = 0.1;

/// Arithmetic mean, `0` for an empty slice.
pub fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f32>() / xs.len() as f32
}

/// Population standard deviation, `0` for an empty slice.
pub fn std(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f32>() / xs.len() as f32;
    var.sqrt()
}

/// Mean of the lowest `ceil(alpha * n)` values.
pub fn cvar(xs: &[f32], alpha: f32) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by_key(|&x| OrderedFloat(x));
    let k = ((alpha * xs.len() as f32).ceil() as usize).clamp(1, xs.len());
    mean(&sorted[..k])
}

/// Reference scores of a domain used to normalize returns.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScoreNormalizer {
    /// Return of a random policy.
    pub ref_min: f32,

    /// Return of an expert policy.
    pub ref_max: f32,
}

impl ScoreNormalizer {
    /// Constructs a normalizer.
    pub fn new(ref_min: f32, ref_max: f32) -> Self {
        Self { ref_min, ref_max }
    }

    /// `100 * (score - ref_min) / (ref_max - ref_min)`.
    ///
    /// Returns `None` when the reference scores do not span a range.
    pub fn normalize(&self, score: f32) -> Option<f32> {
        let range = self.ref_max - self.ref_min;
        match range.is_finite() && range != 0.0 {
            true => Some(100.0 * (score - self.ref_min) / range),
            false => None,
        }
    }
}

/// Result of an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRecord {
    /// Total reward of every episode.
    pub rewards: Vec<f32>,

    /// Mean of `rewards`.
    pub mean: f32,

    /// Population standard deviation of `rewards`.
    pub std: f32,

    /// Mean of the worst 10% of `rewards`.
    pub cvar_10pct: f32,

    /// Normalized mean, when reference scores are available.
    pub normalized_score: Option<f32>,
}

impl EvalRecord {
    /// Computes the statistics of episode rewards.
    pub fn from_rewards(rewards: Vec<f32>, normalizer: Option<&ScoreNormalizer>) -> Self {
        let mean = mean(&rewards);
        Self {
            std: std(&rewards),
            cvar_10pct: cvar(&rewards, CVAR_ALPHA),
            normalized_score: normalizer.and_then(|n| n.normalize(mean)),
            mean,
            rewards,
        }
    }

    /// The normalized score, or the raw mean without reference scores.
    pub fn score(&self) -> f32 {
        self.normalized_score.unwrap_or(self.mean)
    }

    /// The evaluation log line.
    pub fn log_line(&self, epoch: usize) -> String {
        format!(
            "Epoch {} Eval_Reward {:.2} Eval_Cvar {:.2} Eval_Std {:.2} Normalized_Score {:.2}",
            epoch,
            self.mean,
            self.cvar_10pct,
            self.std,
            self.score()
        )
    }

    /// Converts into a [`Record`].
    pub fn to_record(&self) -> Record {
        Record::from_slice(&[
            ("eval_reward", RecordValue::Scalar(self.mean)),
            ("eval_cvar", RecordValue::Scalar(self.cvar_10pct)),
            ("eval_std", RecordValue::Scalar(self.std)),
            ("normalized_score", RecordValue::Scalar(self.score())),
            ("eval_rewards", RecordValue::Array1(self.rewards.clone())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cvar_of_ten() {
        let r: Vec<f32> = (1..=10).map(|x| x as f32).collect();
        assert_eq!(cvar(&r, CVAR_ALPHA), 1.0);

        // Order does not matter
        let r: Vec<f32> = (1..=10).rev().map(|x| x as f32).collect();
        assert_eq!(cvar(&r, CVAR_ALPHA), 1.0);
    }

    #[test]
    fn test_cvar_rounds_up() {
        // ceil(0.1 * 11) = 2
        let r: Vec<f32> = (1..=11).map(|x| x as f32).collect();
        assert_eq!(cvar(&r, CVAR_ALPHA), 1.5);
        assert_eq!(cvar(&[4.0, 2.0], CVAR_ALPHA), 2.0);
        assert_eq!(cvar(&[7.0], CVAR_ALPHA), 7.0);
    }

    #[test]
    fn test_mean_std() {
        let r = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&r), 5.0);
        assert_eq!(std(&r), 2.0);
    }

    #[test]
    fn test_normalized_score_boundaries() {
        let n = ScoreNormalizer::new(-20.0, 80.0);
        assert_eq!(n.normalize(-20.0), Some(0.0));
        assert_eq!(n.normalize(80.0), Some(100.0));
        assert_eq!(n.normalize(30.0), Some(50.0));

        let rec = EvalRecord::from_rewards(vec![-20.0, -20.0], Some(&n));
        assert_eq!(rec.normalized_score, Some(0.0));
    }

    #[test]
    fn test_equal_reference_scores() {
        let n = ScoreNormalizer::new(5.0, 5.0);
        assert_eq!(n.normalize(5.0), None);
        assert_eq!(n.normalize(7.0), None);

        // Falls back to the raw mean
        let rec = EvalRecord::from_rewards(vec![1.0, 3.0], Some(&n));
        assert_eq!(rec.normalized_score, None);
        assert_eq!(rec.score(), 2.0);
        assert!(rec.log_line(1).ends_with("Normalized_Score 2.00"));
    }

    #[test]
    fn test_log_line() {
        let rec = EvalRecord::from_rewards(vec![1.0, 3.0], None);
        assert_eq!(rec.normalized_score, None);
        assert_eq!(
            rec.log_line(4),
            "Epoch 4 Eval_Reward 2.00 Eval_Cvar 1.00 Eval_Std 1.00 Normalized_Score 2.00"
        );
        assert_eq!(rec.to_record().get_scalar("eval_cvar").unwrap(), 1.0);
    }
}
