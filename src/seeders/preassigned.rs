use super::Seeder;
use crate::error::ClusterError;
use crate::tuple::{ArrayTupleStore, TupleStore};
use rand::RngCore;

/// Hands back caller-provided centers unchanged. The number of rows in the
/// provided store is the cluster count.
pub struct PreassignedSeeder {
    seeds: ArrayTupleStore,
}

impl PreassignedSeeder {
    pub fn new(seeds: ArrayTupleStore) -> Self {
        Self { seeds }
    }
}

impl Seeder for PreassignedSeeder {
    fn validate(&self, tuples: &dyn TupleStore, k: usize) -> Result<(), ClusterError> {
        if k != self.seeds.tuple_count() {
            return Err(ClusterError::InvalidConfig(format!(
                "configured for {k} clusters but {} seeds were preassigned",
                self.seeds.tuple_count()
            )));
        }
        if self.seeds.tuple_length() != tuples.tuple_length() {
            return Err(ClusterError::InvalidConfig(format!(
                "seed dimension {} does not match data dimension {}",
                self.seeds.tuple_length(),
                tuples.tuple_length()
            )));
        }
        super::check_cluster_count(k, tuples.tuple_count())
    }

    fn seed(
        &self,
        tuples: &dyn TupleStore,
        k: usize,
        _rng: &mut dyn RngCore,
    ) -> Result<ArrayTupleStore, ClusterError> {
        self.validate(tuples, k)?;
        Ok(self.seeds.clone())
    }
}
