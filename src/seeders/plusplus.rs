use super::{check_cluster_count, Seeder};
use crate::distances::{DistanceMetric, EuclideanDistance};
use crate::error::ClusterError;
use crate::tuple::{ArrayTupleStore, TupleStore, TupleStoreMut};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use std::sync::Arc;

/// K-means++ seeding.
///
/// The first center is a uniformly chosen row. Every following center is
/// drawn with probability proportional to the squared distance between a row
/// and its nearest already-chosen center, which biases selection towards rows
/// far from the current centers.
pub struct KMeansPlusPlusSeeder {
    metric: Arc<dyn DistanceMetric>,
}

impl KMeansPlusPlusSeeder {
    pub fn new(metric: Arc<dyn DistanceMetric>) -> Self {
        Self { metric }
    }
}

impl Default for KMeansPlusPlusSeeder {
    fn default() -> Self {
        Self::new(Arc::new(EuclideanDistance))
    }
}

impl Seeder for KMeansPlusPlusSeeder {
    fn seed(
        &self,
        tuples: &dyn TupleStore,
        k: usize,
        rng: &mut dyn RngCore,
    ) -> Result<ArrayTupleStore, ClusterError> {
        let count = tuples.tuple_count();
        check_cluster_count(k, count)?;

        let dim = tuples.tuple_length();
        let mut seeds = ArrayTupleStore::new(dim, k);
        let mut buffer = vec![0.0; dim];
        let mut chosen = vec![false; count];

        let first = rng.gen_range(0..count);
        tuples.get_tuple(first, &mut buffer);
        seeds.set_tuple(0, &buffer);
        chosen[first] = true;

        // Squared distance from each row to its nearest chosen center,
        // refreshed incrementally with only the newest center.
        let mut weights = vec![f64::INFINITY; count];
        let mut latest = buffer.clone();

        for seed_row in 1..k {
            seeds.get_tuple(seed_row - 1, &mut latest);
            for row in 0..count {
                tuples.get_tuple(row, &mut buffer);
                let d = self.metric.distance(&buffer, &latest);
                let squared = d * d;
                if squared < weights[row] {
                    weights[row] = squared;
                }
            }

            let next = match WeightedIndex::new(&weights) {
                Ok(index) => index.sample(rng),
                // All remaining rows coincide with a chosen center; fall
                // back to the lowest row index not yet chosen.
                Err(_) => chosen
                    .iter()
                    .position(|&taken| !taken)
                    .ok_or_else(|| {
                        ClusterError::InvalidConfig(format!(
                            "cannot seed {k} distinct clusters from {count} tuples"
                        ))
                    })?,
            };
            tuples.get_tuple(next, &mut buffer);
            seeds.set_tuple(seed_row, &buffer);
            chosen[next] = true;
        }
        Ok(seeds)
    }
}
