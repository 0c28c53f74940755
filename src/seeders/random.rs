use super::{check_cluster_count, Seeder};
use crate::error::ClusterError;
use crate::tuple::{ArrayTupleStore, TupleStore, TupleStoreMut};
use rand::seq::IteratorRandom;
use rand::RngCore;

/// Forgy seeding: K distinct rows chosen uniformly without replacement.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSeeder;

impl Seeder for RandomSeeder {
    fn seed(
        &self,
        tuples: &dyn TupleStore,
        k: usize,
        mut rng: &mut dyn RngCore,
    ) -> Result<ArrayTupleStore, ClusterError> {
        check_cluster_count(k, tuples.tuple_count())?;

        let dim = tuples.tuple_length();
        let mut seeds = ArrayTupleStore::new(dim, k);
        let mut buffer = vec![0.0; dim];
        let chosen = (0..tuples.tuple_count()).choose_multiple(&mut rng, k);
        for (seed_row, data_row) in chosen.into_iter().enumerate() {
            tuples.get_tuple(data_row, &mut buffer);
            seeds.set_tuple(seed_row, &buffer);
        }
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    #[test]
    fn picks_distinct_rows() {
        let tuples = ArrayTupleStore::from_values((0..10).map(f64::from).collect(), 10, 1);
        let mut rng = StdRng::seed_from_u64(1);
        let seeds = RandomSeeder.seed(&tuples, 10, &mut rng).unwrap();

        let mut values: Vec<f64> = (0..10).map(|row| seeds.tuple(row)[0]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, (0..10).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn rejects_bad_cluster_counts() {
        let tuples = ArrayTupleStore::new(1, 3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(RandomSeeder.seed(&tuples, 0, &mut rng).is_err());
        assert!(RandomSeeder.seed(&tuples, 4, &mut rng).is_err());
    }
}
