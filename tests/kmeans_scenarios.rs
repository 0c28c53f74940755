use gmeans::*;
use rand::prelude::*;
use std::sync::{Arc, Mutex};

fn random_store(n: usize, dim: usize, seed: u64) -> Arc<ArrayTupleStore> {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples: Vec<f64> = (0..n * dim).map(|_| rng.gen_range(-10.0..10.0)).collect();
    Arc::new(ArrayTupleStore::from_values(samples, n, dim))
}

fn run_kmeans(tuples: Arc<ArrayTupleStore>, config: KMeansConfig) -> Vec<Cluster> {
    let clusterer = KMeansClusterer::new(tuples, config).unwrap();
    clusterer.run().unwrap();
    clusterer.get().unwrap()
}

#[test]
fn partition_is_complete_and_disjoint() {
    let n = 500;
    let tuples = random_store(n, 3, 11);
    let config = KMeansConfig::build().cluster_count(7).rng_seed(42).build();
    let clusters = run_kmeans(tuples, config);

    assert_eq!(clusters.len(), 7);
    let mut seen = vec![false; n];
    for cluster in &clusters {
        for &row in cluster.members() {
            assert!(!seen[row], "row {row} assigned to two clusters");
            seen[row] = true;
        }
    }
    assert!(seen.iter().all(|&s| s), "some rows were never assigned");
}

#[test]
fn centroids_match_member_means() {
    let n = 400;
    let dim = 4;
    let tuples = random_store(n, dim, 5);
    let config = KMeansConfig::build().cluster_count(5).rng_seed(17).build();
    let clusters = run_kmeans(Arc::clone(&tuples), config);

    for cluster in clusters.iter().filter(|c| !c.is_empty()) {
        let mut expected = vec![0.0; dim];
        let mut buffer = vec![0.0; dim];
        for &row in cluster.members() {
            tuples.get_tuple(row, &mut buffer);
            for (e, v) in expected.iter_mut().zip(&buffer) {
                *e += v;
            }
        }
        for e in expected.iter_mut() {
            *e /= cluster.member_count() as f64;
        }
        for (have, want) in cluster.centroid().iter().zip(&expected) {
            let scale = want.abs().max(1.0);
            assert!(
                (have - want).abs() <= 1e-9 * scale,
                "centroid {have} deviates from member mean {want}"
            );
        }
    }
}

#[test]
fn identical_runs_are_identical() {
    let tuples = random_store(300, 2, 77);
    let make_config = || {
        KMeansConfig::build()
            .cluster_count(6)
            .rng_seed(123)
            .build()
    };

    let first = run_kmeans(Arc::clone(&tuples), make_config());
    let second = run_kmeans(tuples, make_config());
    assert_eq!(first, second);
}

#[test]
fn preassigned_seeds_are_deterministic_without_rng_seed() {
    let tuples = random_store(200, 2, 3);
    let seeds = ArrayTupleStore::from_values(vec![-5.0, -5.0, 0.0, 0.0, 5.0, 5.0], 3, 2);
    let make_config = || {
        KMeansConfig::build()
            .cluster_count(3)
            .seeder(PreassignedSeeder::new(seeds.clone()))
            .build()
    };

    let first = run_kmeans(Arc::clone(&tuples), make_config());
    let second = run_kmeans(tuples, make_config());
    assert_eq!(first, second);
}

#[derive(Clone, Default)]
struct ProgressRecorder {
    values: Arc<Mutex<Vec<f64>>>,
}

impl TaskListener for ProgressRecorder {
    fn task_progress(&mut self, progress: f64) {
        self.values.lock().unwrap().push(progress);
    }
}

#[test]
fn progress_is_monotone_and_windowed() {
    let tuples = random_store(1000, 2, 9);
    let config = KMeansConfig::build()
        .cluster_count(10)
        .max_iterations(30)
        .rng_seed(4)
        .build();

    let clusterer = KMeansClusterer::new(tuples, config).unwrap();
    clusterer
        .task()
        .set_progress_endpoints(0.25, 0.75)
        .unwrap();
    let recorder = ProgressRecorder::default();
    clusterer.add_listener(Box::new(recorder.clone()));

    clusterer.run().unwrap();
    clusterer.get().unwrap();

    let values = recorder.values.lock().unwrap().clone();
    assert!(!values.is_empty(), "bounded run must report progress");
    for pair in values.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {pair:?}");
    }
    for &value in &values {
        assert!((0.25..=0.75).contains(&value), "progress {value} escaped the window");
    }
}

#[test]
fn moves_goal_stops_early() {
    let tuples = random_store(2000, 2, 21);
    // A goal this large is met after the very first boundary.
    let config = KMeansConfig::build()
        .cluster_count(4)
        .moves_goal(1_000_000)
        .rng_seed(1)
        .build();

    let clusters = run_kmeans(tuples, config);
    let total: usize = clusters.iter().map(Cluster::member_count).sum();
    assert_eq!(total, 2000);
}

#[test]
fn single_cluster_collapses_to_global_mean() {
    let tuples = random_store(128, 3, 2);
    let config = KMeansConfig::build().cluster_count(1).rng_seed(8).build();
    let clusters = run_kmeans(Arc::clone(&tuples), config);

    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].member_count(), 128);
    let mut buffer = vec![0.0; 3];
    let mut mean = vec![0.0; 3];
    for row in 0..128 {
        tuples.get_tuple(row, &mut buffer);
        for (m, v) in mean.iter_mut().zip(&buffer) {
            *m += v;
        }
    }
    for m in mean.iter_mut() {
        *m /= 128.0;
    }
    for (have, want) in clusters[0].centroid().iter().zip(&mean) {
        assert!((have - want).abs() < 1e-9);
    }
}
