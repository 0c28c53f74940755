//! Strategies producing the K initial centers a k-means pass starts from.

mod plusplus;
mod preassigned;
mod random;

pub use plusplus::KMeansPlusPlusSeeder;
pub use preassigned::PreassignedSeeder;
pub use random::RandomSeeder;

use crate::error::ClusterError;
use crate::tuple::{ArrayTupleStore, TupleStore};
use rand::RngCore;

/// Produces K initial centers from a tuple store.
pub trait Seeder: Send + Sync {
    /// Cheap configuration check run synchronously when a clusterer is
    /// built, so misconfiguration never surfaces from inside a running task.
    fn validate(&self, tuples: &dyn TupleStore, k: usize) -> Result<(), ClusterError> {
        check_cluster_count(k, tuples.tuple_count())
    }

    /// Returns a store of exactly K rows of the data's dimension.
    fn seed(
        &self,
        tuples: &dyn TupleStore,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<ArrayTupleStore, ClusterError>;
}

pub(crate) fn check_cluster_count(k: usize, tuple_count: usize) -> Result<(), ClusterError> {
    if k == 0 {
        return Err(ClusterError::InvalidConfig(
            "cluster count must be at least 1".into(),
        ));
    }
    if k > tuple_count {
        return Err(ClusterError::InvalidConfig(format!(
            "cannot seed {k} clusters from {tuple_count} tuples"
        )));
    }
    Ok(())
}
