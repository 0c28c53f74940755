//! Adaptive clustering that discovers the cluster count on its own.
//!
//! G-means starts from a single cluster and repeatedly proposes splitting
//! each cluster in two with a local k-means pass. A proposed split is kept
//! only when the cluster's projection onto the axis between the two child
//! centers fails an Anderson–Darling normality test; clusters whose
//! projection looks Gaussian are emitted as final.

use crate::cluster::{Cluster, ClusterStats};
use crate::distances::{DistanceMetric, EuclideanDistance};
use crate::error::ClusterError;
use crate::kmeans::{cluster_kmeans, KMeansConfig};
use crate::math;
use crate::seeders::PreassignedSeeder;
use crate::task::{Cancelable, ListenerId, Task, TaskContext, TaskListener};
use crate::tuple::{ArrayTupleStore, FilteredTupleStore, TupleStore, TupleStoreMut};
use rand::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

/// Configuration of an adaptive G-means run.
#[derive(Clone)]
pub struct GMeansConfig {
    pub(crate) metric: Arc<dyn DistanceMetric>,
    pub(crate) significance: f64,
    pub(crate) min_cluster_size: Option<usize>,
    pub(crate) max_clusters: Option<usize>,
    pub(crate) rng_seed: Option<u64>,
}

impl Default for GMeansConfig {
    fn default() -> Self {
        Self {
            metric: Arc::new(EuclideanDistance),
            significance: 1e-4,
            min_cluster_size: None,
            max_clusters: None,
            rng_seed: None,
        }
    }
}

impl GMeansConfig {
    pub fn build() -> GMeansConfigBuilder {
        GMeansConfigBuilder {
            config: GMeansConfig::default(),
        }
    }
}

pub struct GMeansConfigBuilder {
    config: GMeansConfig,
}

impl GMeansConfigBuilder {
    /// Distance metric used by the inner k-means passes.
    pub fn metric<M: DistanceMetric + 'static>(mut self, metric: M) -> Self {
        self.config.metric = Arc::new(metric);
        self
    }

    /// Significance level of the Anderson–Darling accept test. Smaller
    /// values split less eagerly. Must lie in (0, 1); defaults to 1e-4.
    pub fn significance(mut self, significance: f64) -> Self {
        self.config.significance = significance;
        self
    }

    /// Clusters smaller than this are never considered for splitting.
    /// Defaults to `max(8, 2 * dimension)`; 8 is the sample size below which
    /// the normality test is degenerate.
    pub fn min_cluster_size(mut self, min_cluster_size: usize) -> Self {
        self.config.min_cluster_size = Some(min_cluster_size);
        self
    }

    /// Upper bound on the number of clusters produced. Unset means no bound.
    pub fn max_clusters(mut self, max_clusters: usize) -> Self {
        self.config.max_clusters = Some(max_clusters);
        self
    }

    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> GMeansConfig {
        self.config
    }
}

/// An adaptive G-means run wrapped in a [`Task`].
///
/// ```
/// use gmeans::{ArrayTupleStore, GMeansClusterer, GMeansConfig};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), gmeans::ClusterError> {
/// // Two obvious groups of twenty points each on the line.
/// let mut samples = Vec::new();
/// for i in 0..20 {
///     samples.push(i as f64 * 0.01);
///     samples.push(100.0 + i as f64 * 0.01);
/// }
/// let tuples = Arc::new(ArrayTupleStore::from_values(samples, 40, 1));
///
/// let clusterer = GMeansClusterer::new(tuples, GMeansConfig::build().rng_seed(7).build())?;
/// clusterer.run()?;
/// let clusters = clusterer.get()?;
/// assert_eq!(clusters.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct GMeansClusterer {
    task: Task<Vec<Cluster>>,
}

impl GMeansClusterer {
    pub fn new(tuples: Arc<dyn TupleStore>, config: GMeansConfig) -> Result<Self, ClusterError> {
        if tuples.tuple_count() == 0 {
            return Err(ClusterError::InvalidConfig(
                "cannot cluster an empty tuple store".into(),
            ));
        }
        if !(config.significance > 0.0 && config.significance < 1.0) {
            return Err(ClusterError::InvalidConfig(format!(
                "significance must lie in (0, 1), got {}",
                config.significance
            )));
        }
        if config.max_clusters == Some(0) {
            return Err(ClusterError::InvalidConfig(
                "max_clusters must be at least 1".into(),
            ));
        }

        let task = Task::new("g-means", move |ctx: &TaskContext| {
            split_until_gaussian(&tuples, &config, ctx)
        });
        Ok(Self { task })
    }

    /// Runs the controller on the calling thread. See [`Task::run`].
    pub fn run(&self) -> Result<(), ClusterError> {
        self.task.run()
    }

    /// Blocks until terminal and returns the final clusters. See
    /// [`Task::get`].
    pub fn get(&self) -> Result<Vec<Cluster>, ClusterError> {
        self.task.get()
    }

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

impl Cancelable for GMeansClusterer {
    fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }
}

fn split_until_gaussian(
    tuples: &Arc<dyn TupleStore>,
    config: &GMeansConfig,
    ctx: &TaskContext,
) -> Result<Vec<Cluster>, ClusterError> {
    let n = tuples.tuple_count();
    let dim = tuples.tuple_length();
    let min_size = config.min_cluster_size.unwrap_or_else(|| 8.max(2 * dim));
    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Work queue is FIFO; the traversal order is part of the contract.
    let mut queue: VecDeque<Cluster> = VecDeque::new();
    let all_rows: Vec<usize> = (0..n).collect();
    let (mean, _) = math::mean_and_variance(&**tuples, &all_rows)?;
    queue.push_back(Cluster::new(all_rows, mean));

    let mut finals: Vec<Cluster> = Vec::new();
    let mut emitted_rows = 0usize;

    while let Some(cluster) = queue.pop_front() {
        ctx.check_point()?;

        let capped = config
            .max_clusters
            .map_or(false, |max| finals.len() + queue.len() + 2 > max);
        if cluster.member_count() < min_size || capped {
            emit(cluster, &mut finals, &mut emitted_rows, n, ctx);
            continue;
        }

        let children = propose_split(tuples, config, &cluster, &mut rng, ctx)?;
        let Some((left, right)) = children else {
            // A degenerate split (an empty child) means the cluster cannot
            // be divided; keep it whole.
            emit(cluster, &mut finals, &mut emitted_rows, n, ctx);
            continue;
        };

        if accepts_as_gaussian(&**tuples, config, &cluster, &left, &right) {
            emit(cluster, &mut finals, &mut emitted_rows, n, ctx);
        } else {
            ctx.post_message(&format!(
                "split cluster of {} into {} + {}",
                cluster.member_count(),
                left.member_count(),
                right.member_count()
            ));
            queue.push_back(left);
            queue.push_back(right);
        }
    }

    log::debug!("g-means settled on {} clusters", finals.len());
    Ok(finals)
}

fn emit(
    cluster: Cluster,
    finals: &mut Vec<Cluster>,
    emitted_rows: &mut usize,
    total_rows: usize,
    ctx: &TaskContext,
) {
    *emitted_rows += cluster.member_count();
    ctx.post_message(&format!(
        "cluster of {} accepted as final",
        cluster.member_count()
    ));
    ctx.post_progress(*emitted_rows as f64 / total_rows as f64);
    finals.push(cluster);
}

/// Runs a single-threaded 2-center k-means pass over the cluster's members,
/// seeded one standard deviation either side of the cluster mean. Returns
/// `None` when either child ends up empty.
fn propose_split(
    tuples: &Arc<dyn TupleStore>,
    config: &GMeansConfig,
    cluster: &Cluster,
    rng: &mut StdRng,
    ctx: &TaskContext,
) -> Result<Option<(Cluster, Cluster)>, ClusterError> {
    let dim = tuples.tuple_length();
    let stats = ClusterStats::mean_and_variance(&**tuples, cluster)?;

    let mut seeds = ArrayTupleStore::new(dim, 2);
    let mut low = vec![0.0; dim];
    let mut high = vec![0.0; dim];
    for col in 0..dim {
        let sdev = stats.variance[col].sqrt();
        low[col] = stats.mean[col] - sdev;
        high[col] = stats.mean[col] + sdev;
    }
    seeds.set_tuple(0, &low);
    seeds.set_tuple(1, &high);

    let filtered = FilteredTupleStore::new(Arc::clone(tuples), cluster.members().to_vec());
    let inner = KMeansConfig {
        cluster_count: 2,
        max_iterations: None,
        moves_goal: 0,
        worker_threads: 1,
        replace_empty_clusters: false,
        metric: Arc::clone(&config.metric),
        seeder: Arc::new(PreassignedSeeder::new(seeds)),
        rng_seed: None,
    };
    let children = cluster_kmeans(&filtered, &inner, rng, |_, _| ctx.check_point())?;

    let mut remapped = children.into_iter().map(|child| {
        let members = child
            .members()
            .iter()
            .map(|&local| filtered.local_to_original(local))
            .collect();
        Cluster::new(members, child.centroid().to_vec())
    });
    let left = remapped.next().expect("inner pass produces two clusters");
    let right = remapped.next().expect("inner pass produces two clusters");
    if left.is_empty() || right.is_empty() {
        return Ok(None);
    }
    Ok(Some((left, right)))
}

/// The accept test: project every member onto the axis between the two child
/// centers and check the projection for normality.
fn accepts_as_gaussian(
    tuples: &dyn TupleStore,
    config: &GMeansConfig,
    cluster: &Cluster,
    left: &Cluster,
    right: &Cluster,
) -> bool {
    let dim = tuples.tuple_length();
    let axis: Vec<f64> = left
        .centroid()
        .iter()
        .zip(right.centroid())
        .map(|(l, r)| l - r)
        .collect();

    let mut buffer = vec![0.0; dim];
    let projected: Vec<f64> = cluster
        .members()
        .iter()
        .map(|&row| {
            tuples.get_tuple(row, &mut buffer);
            math::dot(&buffer, &axis)
        })
        .collect();

    math::anderson_darling_gaussian(&projected, config.significance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_configurations() {
        let tuples: Arc<dyn TupleStore> = Arc::new(ArrayTupleStore::new(1, 0));
        assert!(GMeansClusterer::new(tuples, GMeansConfig::default()).is_err());

        let tuples: Arc<dyn TupleStore> =
            Arc::new(ArrayTupleStore::from_values(vec![1.0, 2.0], 2, 1));
        let bad_alpha = GMeansConfig::build().significance(0.0).build();
        assert!(GMeansClusterer::new(Arc::clone(&tuples), bad_alpha).is_err());

        let bad_cap = GMeansConfig::build().max_clusters(0).build();
        assert!(GMeansClusterer::new(tuples, bad_cap).is_err());
    }

    #[test]
    fn tiny_store_stays_one_cluster() {
        // Below the minimum split size everything is emitted as-is.
        let tuples: Arc<dyn TupleStore> =
            Arc::new(ArrayTupleStore::from_values(vec![0.0, 1.0, 2.0], 3, 1));
        let clusterer = GMeansClusterer::new(tuples, GMeansConfig::default()).unwrap();
        clusterer.run().unwrap();
        let clusters = clusterer.get().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members(), &[0, 1, 2]);
        assert_eq!(clusters[0].centroid(), &[1.0]);
    }

    #[test]
    fn max_clusters_caps_splitting() {
        // Four well-separated groups, but a cap of 2 stops after one split.
        let mut samples = Vec::new();
        for group in 0..4 {
            for i in 0..25 {
                samples.push(group as f64 * 1000.0 + i as f64 * 0.1);
            }
        }
        let tuples: Arc<dyn TupleStore> =
            Arc::new(ArrayTupleStore::from_values(samples, 100, 1));
        let config = GMeansConfig::build().max_clusters(2).rng_seed(5).build();
        let clusterer = GMeansClusterer::new(tuples, config).unwrap();
        clusterer.run().unwrap();
        let clusters = clusterer.get().unwrap();
        assert_eq!(clusters.len(), 2);

        let total: usize = clusters.iter().map(Cluster::member_count).sum();
        assert_eq!(total, 100);
    }
}
