//! Names of training runs, used in checkpoint paths.
use mbrl_core::Algorithm;

/// Environments whose runs are named with their risk settings.
pub const RISK_ENVS: &[&str] = &["riskymass", "AntObstacle-v0"];

/// Parameters that identify a training run.
#[derive(Debug, Clone)]
pub struct RunName {
    /// Environment name.
    pub env: String,

    /// Algorithm.
    pub algorithm: Algorithm,

    /// Name of the conservative penalty of the return distribution.
    pub dist_penalty: String,

    /// Name of the risk measure.
    pub risk_type: String,

    /// Parameter of the risk measure.
    pub risk_param: f64,

    /// Weight of the conservative penalty.
    pub min_z_weight: f64,

    /// Threshold of the Lagrange multiplier.
    pub lag: f64,

    /// Whether the entropy coefficient is tuned.
    pub entropy: bool,

    /// Probability of the penalty in the risky region.
    pub risk_prob: f32,

    /// Penalty in the risky region.
    pub risk_penalty: f32,

    /// Random seed.
    pub seed: u64,
}

impl RunName {
    /// Formats the run name.
    ///
    /// Risk environments give
    /// `offline-{risk_prob}-{risk_penalty}-{algo}-{dist_penalty}-{risk_type}{risk_param}-E{entropy}-{seed}`,
    /// other environments `offline-{algo}-{dist_penalty}-{risk_type}{risk_param}-{seed}`.
    /// For `dsac`, `-Z{min_z_weight}-L{lag}-E{entropy}` precedes the seed in both cases.
    pub fn format(&self) -> String {
        let head = match RISK_ENVS.contains(&self.env.as_str()) {
            true => format!("offline-{}-{}-", self.risk_prob, self.risk_penalty),
            false => "offline-".to_string(),
        };
        let body = format!(
            "{}-{}-{}{}",
            self.algorithm, self.dist_penalty, self.risk_type, self.risk_param
        );
        let tail = match (self.algorithm, RISK_ENVS.contains(&self.env.as_str())) {
            (Algorithm::Dsac, _) => format!(
                "-Z{}-L{}-E{}",
                self.min_z_weight, self.lag, self.entropy
            ),
            (_, true) => format!("-E{}", self.entropy),
            (_, false) => String::new(),
        };
        format!("{}{}{}-{}", head, body, tail, self.seed)
    }
}
