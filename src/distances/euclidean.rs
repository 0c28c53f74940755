use super::DistanceMetric;
use crate::math;

/// Plain Euclidean distance, the default metric for both engines.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanDistance;

impl DistanceMetric for EuclideanDistance {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        math::euclidean_distance(a, b)
    }
}
