use crate::error::ClusterError;
use crate::math;
use crate::tuple::TupleStore;

/// An immutable cluster: a sorted, duplicate-free set of member row indices
/// into some tuple store, plus the centroid those members had when the
/// cluster was built. Engines create clusters at iteration boundaries and at
/// completion; a cluster is never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    members: Vec<usize>,
    centroid: Vec<f64>,
}

impl Cluster {
    pub fn new(mut members: Vec<usize>, centroid: Vec<f64>) -> Self {
        members.sort_unstable();
        members.dedup();
        Self { members, centroid }
    }

    /// Member row indices, sorted ascending.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }
}

/// Per-column reductions over a cluster's members.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterStats {
    /// Per-column arithmetic mean.
    pub mean: Vec<f64>,
    /// Per-column biased variance (denominator n).
    pub variance: Vec<f64>,
}

impl ClusterStats {
    pub fn mean_and_variance(
        tuples: &dyn TupleStore,
        cluster: &Cluster,
    ) -> Result<ClusterStats, ClusterError> {
        let (mean, variance) = math::mean_and_variance(tuples, cluster.members())?;
        Ok(ClusterStats { mean, variance })
    }
}
