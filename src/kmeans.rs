//! One k-means refinement pass over a tuple store, hosted in a [`Task`].

use crate::cluster::Cluster;
use crate::distances::{DistanceMetric, EuclideanDistance};
use crate::error::ClusterError;
use crate::seeders::{KMeansPlusPlusSeeder, Seeder};
use crate::task::{Cancelable, ListenerId, Task, TaskContext, TaskListener};
use crate::tuple::TupleStore;
use rand::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

/// Configuration of a k-means pass.
///
/// Build one with [`KMeansConfig::build`]:
///
/// ```
/// use gmeans::KMeansConfig;
///
/// let config = KMeansConfig::build()
///     .cluster_count(8)
///     .max_iterations(300)
///     .rng_seed(1337)
///     .build();
/// ```
#[derive(Clone)]
pub struct KMeansConfig {
    pub(crate) cluster_count: usize,
    pub(crate) max_iterations: Option<usize>,
    pub(crate) moves_goal: usize,
    pub(crate) worker_threads: usize,
    pub(crate) replace_empty_clusters: bool,
    pub(crate) metric: Arc<dyn DistanceMetric>,
    pub(crate) seeder: Arc<dyn Seeder>,
    pub(crate) rng_seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            cluster_count: 1,
            max_iterations: None,
            moves_goal: 0,
            worker_threads: 0,
            replace_empty_clusters: false,
            metric: Arc::new(EuclideanDistance),
            seeder: Arc::new(KMeansPlusPlusSeeder::default()),
            rng_seed: None,
        }
    }
}

impl KMeansConfig {
    /// Returns a [`KMeansConfigBuilder`] initialized with the defaults.
    pub fn build() -> KMeansConfigBuilder {
        KMeansConfigBuilder {
            config: KMeansConfig::default(),
        }
    }
}

pub struct KMeansConfigBuilder {
    config: KMeansConfig,
}

impl KMeansConfigBuilder {
    /// Number of clusters K to search for. Required; must be at least 1 and
    /// at most the number of tuples.
    pub fn cluster_count(mut self, k: usize) -> Self {
        self.config.cluster_count = k;
        self
    }

    /// Limit on refinement iterations. Unset means unbounded.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = Some(max_iterations);
        self
    }

    /// The pass converges once fewer than this many tuples changed cluster
    /// in an iteration. An iteration with zero moves always converges.
    pub fn moves_goal(mut self, moves_goal: usize) -> Self {
        self.config.moves_goal = moves_goal;
        self
    }

    /// Worker threads for the assignment and reduction steps. Zero (the
    /// default) uses all available cores.
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.worker_threads = worker_threads;
        self
    }

    /// When set, a cluster that loses all members gets its center relocated
    /// to the tuple farthest from its assigned center instead of staying
    /// empty.
    pub fn replace_empty_clusters(mut self, replace: bool) -> Self {
        self.config.replace_empty_clusters = replace;
        self
    }

    /// Distance metric used for assignment. Defaults to Euclidean.
    pub fn metric<M: DistanceMetric + 'static>(mut self, metric: M) -> Self {
        self.config.metric = Arc::new(metric);
        self
    }

    /// Strategy producing the initial centers. Defaults to k-means++.
    pub fn seeder<S: Seeder + 'static>(mut self, seeder: S) -> Self {
        self.config.seeder = Arc::new(seeder);
        self
    }

    /// Seed for the random generator. Set one for deterministically
    /// repeatable runs.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> KMeansConfig {
        self.config
    }
}

/// A k-means clustering pass wrapped in a [`Task`].
///
/// ```
/// use gmeans::{ArrayTupleStore, KMeansClusterer, KMeansConfig};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), gmeans::ClusterError> {
/// let samples = vec![0.0, 0.0, 0.0, 1.0, 10.0, 0.0, 10.0, 1.0];
/// let tuples = Arc::new(ArrayTupleStore::from_values(samples, 4, 2));
/// let config = KMeansConfig::build().cluster_count(2).rng_seed(1).build();
///
/// let clusterer = KMeansClusterer::new(tuples, config)?;
/// clusterer.run()?;
/// let clusters = clusterer.get()?;
/// assert_eq!(clusters.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct KMeansClusterer {
    task: Task<Vec<Cluster>>,
}

impl KMeansClusterer {
    /// Validates the configuration against the store and prepares the task.
    /// All configuration faults are raised here, never from inside the run.
    pub fn new(tuples: Arc<dyn TupleStore>, config: KMeansConfig) -> Result<Self, ClusterError> {
        validate_config(&*tuples, &config)?;

        let task = Task::new("k-means", move |ctx: &TaskContext| {
            let mut rng = match config.rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let max_iterations = config.max_iterations;
            let moves_goal = config.moves_goal;
            cluster_kmeans(&*tuples, &config, &mut rng, |iteration, moves| {
                ctx.check_point()?;
                ctx.post_message(&format!(
                    "iteration {iteration}: {moves} tuples changed cluster"
                ));
                // Progress is the more pessimistic of the two available
                // estimates: fraction of the iteration budget used, and how
                // close the move count is to the convergence goal.
                let mut fraction = f64::INFINITY;
                if let Some(max) = max_iterations {
                    fraction = fraction.min(iteration as f64 / max as f64);
                }
                if moves_goal > 0 && moves > 0 {
                    fraction = fraction.min(moves_goal as f64 / moves as f64);
                }
                if fraction.is_finite() {
                    ctx.post_progress(fraction.min(1.0));
                }
                Ok(())
            })
        });
        Ok(Self { task })
    }

    /// Runs the pass on the calling thread. See [`Task::run`].
    pub fn run(&self) -> Result<(), ClusterError> {
        self.task.run()
    }

    /// Blocks until terminal and returns the clusters. See [`Task::get`].
    pub fn get(&self) -> Result<Vec<Cluster>, ClusterError> {
        self.task.get()
    }

    /// The underlying task, for lifecycle control and event registration.
    pub fn task(&self) -> &Task<Vec<Cluster>> {
        &self.task
    }

    pub fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        self.task.cancel(may_interrupt_if_running)
    }

    pub fn add_listener(&self, listener: Box<dyn TaskListener>) -> ListenerId {
        self.task.add_listener(listener)
    }
}

impl Cancelable for KMeansClusterer {
    fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }
}

fn validate_config(tuples: &dyn TupleStore, config: &KMeansConfig) -> Result<(), ClusterError> {
    if tuples.tuple_count() == 0 {
        return Err(ClusterError::InvalidConfig(
            "cannot cluster an empty tuple store".into(),
        ));
    }
    if config.max_iterations == Some(0) {
        return Err(ClusterError::InvalidConfig(
            "max_iterations must be at least 1".into(),
        ));
    }
    config.seeder.validate(tuples, config.cluster_count)
}

/// The refinement loop itself, shared by [`KMeansClusterer`] and the G-means
/// controller's inner passes. `iteration_done(iteration, moves)` is invoked
/// at every iteration boundary; an error returned from it (such as an
/// observed cancellation) unwinds the pass.
pub(crate) fn cluster_kmeans(
    tuples: &dyn TupleStore,
    config: &KMeansConfig,
    rng: &mut dyn RngCore,
    mut iteration_done: impl FnMut(usize, usize) -> Result<(), ClusterError>,
) -> Result<Vec<Cluster>, ClusterError> {
    let n = tuples.tuple_count();
    let dim = tuples.tuple_length();
    let k = config.cluster_count;
    let metric = config.metric.as_ref();

    let seeds = config.seeder.seed(tuples, k, rng)?;
    if seeds.tuple_length() != dim {
        return Err(ClusterError::InvalidConfig(format!(
            "seed dimension {} does not match data dimension {dim}",
            seeds.tuple_length()
        )));
    }

    // One pass through the store up front; the hot loops then work on plain
    // row-major slices.
    let mut data = vec![0.0; n * dim];
    for row in 0..n {
        tuples.get_tuple(row, &mut data[row * dim..(row + 1) * dim]);
    }
    ensure_finite(&data, dim)?;

    let mut centers = vec![0.0; k * dim];
    for center in 0..k {
        seeds.get_tuple(center, &mut centers[center * dim..(center + 1) * dim]);
    }
    ensure_finite(&centers, dim)
        .map_err(|_| ClusterError::Numeric("seed centers contain a non-finite value".into()))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build()
        .map_err(|e| ClusterError::InvalidConfig(format!("cannot build worker pool: {e}")))?;

    let mut assignments = vec![0usize; n];
    let mut next_assignments = vec![0usize; n];
    let mut distances = vec![0.0f64; n];

    // Step 1: assign every row to its nearest seed center; the initial move
    // count is N.
    assign_rows(&pool, &data, dim, &centers, metric, &mut assignments, &mut distances);
    let mut moves = n;
    let mut iteration = 0usize;

    loop {
        iteration += 1;
        if iteration > 1 {
            // Fresh assignment against the centers of the previous
            // iteration, applied atomically at this boundary.
            assign_rows(
                &pool,
                &data,
                dim,
                &centers,
                metric,
                &mut next_assignments,
                &mut distances,
            );
            moves = assignments
                .iter()
                .zip(next_assignments.iter())
                .filter(|(old, new)| old != new)
                .count();
            std::mem::swap(&mut assignments, &mut next_assignments);
        }

        let (mut sums, mut counts) = accumulate_clusters(&pool, &data, dim, &assignments, k);
        if config.replace_empty_clusters && counts.iter().any(|&c| c == 0) {
            moves += reseat_empty_clusters(
                &data,
                dim,
                &mut assignments,
                &mut distances,
                &mut sums,
                &mut counts,
            );
        }
        for center in 0..k {
            // An empty cluster keeps its previous center.
            if counts[center] > 0 {
                let target = &mut centers[center * dim..(center + 1) * dim];
                for (t, s) in target.iter_mut().zip(&sums[center * dim..(center + 1) * dim]) {
                    *t = s / counts[center] as f64;
                }
            }
        }

        iteration_done(iteration, moves)?;

        if moves == 0 || moves < config.moves_goal {
            break;
        }
        if let Some(max) = config.max_iterations {
            if iteration >= max {
                break;
            }
        }
    }

    log::debug!(
        "k-means finished after {iteration} iterations ({moves} moves in the last one)"
    );

    // Emit the final clusters with exact centroids recomputed from the
    // members, sequentially for reproducibility.
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (row, &cluster) in assignments.iter().enumerate() {
        members[cluster].push(row);
    }
    let clusters = members
        .into_iter()
        .enumerate()
        .map(|(cluster, rows)| {
            let centroid = if rows.is_empty() {
                centers[cluster * dim..(cluster + 1) * dim].to_vec()
            } else {
                let mut centroid = vec![0.0; dim];
                for &row in &rows {
                    for (c, v) in centroid.iter_mut().zip(&data[row * dim..(row + 1) * dim]) {
                        *c += v;
                    }
                }
                for c in centroid.iter_mut() {
                    *c /= rows.len() as f64;
                }
                centroid
            };
            Cluster::new(rows, centroid)
        })
        .collect();
    Ok(clusters)
}

fn ensure_finite(values: &[f64], dim: usize) -> Result<(), ClusterError> {
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(ClusterError::Numeric(format!(
            "non-finite value at row {}, column {}",
            pos / dim,
            pos % dim
        )));
    }
    Ok(())
}

/// Nearest-center assignment, partitioned by row range across the pool.
/// Equidistant centers resolve to the lowest center index.
fn assign_rows(
    pool: &rayon::ThreadPool,
    data: &[f64],
    dim: usize,
    centers: &[f64],
    metric: &dyn DistanceMetric,
    assignments: &mut [usize],
    distances: &mut [f64],
) {
    let k = centers.len() / dim;
    // Static-style partitioning: rayon's work stealing is counterproductive
    // for this uniformly expensive loop.
    let work_packet = (assignments.len() / pool.current_num_threads()).max(1);
    pool.install(|| {
        data.par_chunks_exact(dim)
            .with_min_len(work_packet)
            .zip(assignments.par_iter_mut())
            .zip(distances.par_iter_mut())
            .for_each(|((row, assignment), distance)| {
                let mut best = 0usize;
                let mut best_distance = f64::INFINITY;
                for center in 0..k {
                    let d = metric.distance(row, &centers[center * dim..(center + 1) * dim]);
                    if d < best_distance {
                        best_distance = d;
                        best = center;
                    }
                }
                *assignment = best;
                *distance = best_distance;
            });
    });
}

/// Per-cluster member sums and counts, computed as per-worker partials over
/// fixed row blocks and merged in block order so results do not depend on
/// scheduling.
fn accumulate_clusters(
    pool: &rayon::ThreadPool,
    data: &[f64],
    dim: usize,
    assignments: &[usize],
    k: usize,
) -> (Vec<f64>, Vec<usize>) {
    let n = assignments.len();
    let rows_per_block = (n + pool.current_num_threads() - 1)
        .div_euclid(pool.current_num_threads())
        .max(1);

    let partials: Vec<(Vec<f64>, Vec<usize>)> = pool.install(|| {
        data.par_chunks(rows_per_block * dim)
            .zip(assignments.par_chunks(rows_per_block))
            .map(|(rows, block_assignments)| {
                let mut sums = vec![0.0; k * dim];
                let mut counts = vec![0usize; k];
                for (row, &cluster) in rows.chunks_exact(dim).zip(block_assignments) {
                    counts[cluster] += 1;
                    let target = &mut sums[cluster * dim..(cluster + 1) * dim];
                    for (t, v) in target.iter_mut().zip(row) {
                        *t += v;
                    }
                }
                (sums, counts)
            })
            .collect()
    });

    let mut sums = vec![0.0; k * dim];
    let mut counts = vec![0usize; k];
    for (block_sums, block_counts) in partials {
        for (total, partial) in sums.iter_mut().zip(block_sums) {
            *total += partial;
        }
        for (total, partial) in counts.iter_mut().zip(block_counts) {
            *total += partial;
        }
    }
    (sums, counts)
}

/// Relocates each empty cluster's center onto the row farthest from its
/// assigned center (ties resolve to the lowest row index), reassigning that
/// row immediately. Rows alone in their cluster are never taken, otherwise
/// the emptiness would just migrate. Returns the number of reassignments.
fn reseat_empty_clusters(
    data: &[f64],
    dim: usize,
    assignments: &mut [usize],
    distances: &mut [f64],
    sums: &mut [f64],
    counts: &mut [usize],
) -> usize {
    let k = counts.len();
    let mut moves = 0;
    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let mut chosen: Option<(usize, f64)> = None;
        for (row, &assignment) in assignments.iter().enumerate() {
            if counts[assignment] <= 1 {
                continue;
            }
            if chosen.map_or(true, |(_, best)| distances[row] > best) {
                chosen = Some((row, distances[row]));
            }
        }
        let Some((row, _)) = chosen else {
            continue;
        };

        let row_values = &data[row * dim..(row + 1) * dim];
        let previous = assignments[row];
        counts[previous] -= 1;
        counts[empty] += 1;
        for (s, v) in sums[previous * dim..(previous + 1) * dim]
            .iter_mut()
            .zip(row_values)
        {
            *s -= v;
        }
        sums[empty * dim..(empty + 1) * dim].copy_from_slice(row_values);
        assignments[row] = empty;
        // The relocated center sits on the row itself.
        distances[row] = 0.0;
        moves += 1;
    }
    moves
}
