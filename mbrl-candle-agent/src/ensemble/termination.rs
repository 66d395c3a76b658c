use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Termination criterion applied to predicted next states.
///
/// Predictions with non-finite values are always terminal.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub enum TerminationFn {
    /// Never terminates.
    #[default]
    Never,

    /// Terminates when the absolute value of any state element exceeds `bound`.
    OutOfBounds {
        /// Bound of the state elements.
        bound: f32,
    },

    /// Terminates when the first `center.len()` state elements are within
    /// `radius` of `center`.
    GoalRegion {
        /// Center of the goal.
        center: Vec<f32>,

        /// Radius of the goal.
        radius: f32,
    },
}

impl TerminationFn {
    /// Returns `true` if `next_obs` is terminal.
    pub fn is_done(&self, next_obs: ArrayView1<f32>) -> bool {
        if next_obs.iter().any(|x| !x.is_finite()) {
            return true;
        }

        match self {
            Self::Never => false,
            Self::OutOfBounds { bound } => next_obs.iter().any(|x| x.abs() > *bound),
            Self::GoalRegion { center, radius } => {
                let d2: f32 = center
                    .iter()
                    .zip(next_obs.iter())
                    .map(|(c, x)| (c - x).powi(2))
                    .sum();
                d2.sqrt() <= *radius
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_termination() {
        let x = arr1(&[0.5f32, -2.0]);
        assert!(!TerminationFn::Never.is_done(x.view()));
        assert!(TerminationFn::OutOfBounds { bound: 1.0 }.is_done(x.view()));
        assert!(!TerminationFn::OutOfBounds { bound: 3.0 }.is_done(x.view()));

        let goal = TerminationFn::GoalRegion {
            center: vec![0.5, -1.5],
            radius: 0.6,
        };
        assert!(goal.is_done(x.view()));
        assert!(!goal.is_done(arr1(&[0.0f32, 0.0]).view()));
    }

    #[test]
    fn test_non_finite_is_terminal() {
        let x = arr1(&[f32::NAN, 0.0]);
        assert!(TerminationFn::Never.is_done(x.view()));
    }
}
