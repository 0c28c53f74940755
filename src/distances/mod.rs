mod euclidean;

pub use euclidean::EuclideanDistance;

/// A customizable distance function for clustering.
///
/// Implementations must be symmetric, non-negative, and total over finite
/// inputs; metrics are not retried on failure, a panic inside `distance`
/// aborts the running task with an error outcome.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;
}
