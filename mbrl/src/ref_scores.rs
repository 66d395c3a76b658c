//! Reference scores of D4RL domains.
//!
//! The scores are the returns of a random policy (`min`) and an expert policy
//! (`max`) published with D4RL. They apply to every dataset of a domain.
use mbrl_core::ScoreNormalizer;

const REF_SCORES: &[(&str, f32, f32)] = &[
    ("halfcheetah", -280.178_95, 12135.0),
    ("hopper", -20.272_305, 3234.3),
    ("walker2d", 1.629_008, 4592.3),
    ("ant", -325.6, 3879.7),
    ("antmaze", 0.0, 1.0),
    ("maze2d-umaze", 23.85, 161.86),
    ("maze2d-medium", 13.13, 277.39),
    ("maze2d-large", 6.7, 273.99),
    ("pen", 96.262_8, 3076.833),
    ("hammer", -274.856_58, 12794.135),
    ("door", -45.807_06, 2880.569_3),
    ("relocate", -6.125_5, 4233.877),
    ("kitchen", 0.0, 4.0),
];

/// Returns the normalizer of a D4RL dataset name such as `hopper-medium-replay-v0`.
///
/// `None` for environments without reference scores, whose evaluations report
/// the raw mean return.
pub fn reference_scores(env: &str) -> Option<ScoreNormalizer> {
    REF_SCORES
        .iter()
        .filter(|(domain, _, _)| {
            env == *domain
                || env
                    .strip_prefix(domain)
                    .map_or(false, |rest| rest.starts_with('-'))
        })
        .max_by_key(|(domain, _, _)| domain.len())
        .map(|(_, min, max)| ScoreNormalizer::new(*min, *max))
}
