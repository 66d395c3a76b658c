//! Box-shaped observation and action spaces.
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A box in `R^n` given by elementwise lower and upper bounds.
///
/// Bounds may be infinite for observation spaces.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BoxSpace {
    low: Vec<f32>,
    high: Vec<f32>,
}

impl BoxSpace {
    /// Constructs a space from its bounds.
    ///
    /// # Panics
    ///
    /// Panics if `low` and `high` have different lengths.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "bounds of BoxSpace must have the same length");
        Self { low, high }
    }

    /// A `dim`-dimensional space with the same bounds on every axis.
    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// Dimension of the space.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Shape of the space, always one-dimensional.
    pub fn shape(&self) -> Vec<usize> {
        vec![self.dim()]
    }

    /// Lower bounds.
    pub fn low(&self) -> &[f32] {
        &self.low
    }

    /// Upper bounds.
    pub fn high(&self) -> &[f32] {
        &self.high
    }

    /// Returns `true` if `x` lies in the box.
    pub fn contains(&self, x: &[f32]) -> bool {
        x.len() == self.dim()
            && x.iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(v, (l, h))| l <= v && v <= h)
    }

    /// Clips `x` into the box.
    pub fn clip(&self, x: &[f32]) -> Vec<f32> {
        x.iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .map(|(v, (l, h))| v.max(*l).min(*h))
            .collect()
    }

    /// Samples a point uniformly. Unbounded axes are sampled from `[-1, 1]`.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        self.low
            .iter()
            .zip(self.high.iter())
            .map(|(&l, &h)| {
                let (l, h) = (
                    if l.is_finite() { l } else { -1.0 },
                    if h.is_finite() { h } else { 1.0 },
                );
                if l < h {
                    rng.gen_range(l..h)
                } else {
                    l
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sample_within_bounds() {
        let space = BoxSpace::uniform(3, -1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert!(space.contains(&space.sample(&mut rng)));
        }
    }

    #[test]
    fn test_clip() {
        let space = BoxSpace::new(vec![0.0, -1.0], vec![1.0, 1.0]);
        assert_eq!(space.clip(&[2.0, -3.0]), vec![1.0, -1.0]);
    }
}
