//! # gmeans - API documentation
//!
//! gmeans is a numeric clustering library. It partitions a dataset of
//! fixed-length real-valued tuples into groups of mutually similar rows,
//! either with a classic k-means pass or with the adaptive G-means algorithm,
//! which discovers an appropriate cluster count by statistically testing each
//! cluster for Gaussianity and splitting the ones that fail.
//!
//! ## Design target
//! Clustering real datasets runs for minutes, so every run is hosted in a
//! [`Task`]: a single-owner unit of work with cooperative cancellation,
//! pause/resume, progress reporting and a blocking result handle. Callers on
//! other threads control the run through the task while a worker thread
//! drives it.
//!
//! ## Data model
//! Samples are accessed through the [`TupleStore`] trait — N rows of fixed
//! dimension D, read into caller-supplied buffers. [`ArrayTupleStore`] is the
//! flat in-memory implementation; [`FilteredTupleStore`] exposes a subset of
//! another store's rows under contiguous local indices, which is how G-means
//! scopes its inner passes to one cluster's members.
//!
//! ## Supported centroid initializations
//! The outcome of a k-means pass depends on the initial centers. Implemented
//! strategies: [`KMeansPlusPlusSeeder`] (the default), [`RandomSeeder`], and
//! [`PreassignedSeeder`] for caller-supplied centers.
//!
//! ## Example
//! ```rust
//! use gmeans::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), ClusterError> {
//! // Two groups of points on a line.
//! let samples = vec![0.0, 0.2, 0.4, 10.0, 10.2, 10.4];
//! let tuples = Arc::new(ArrayTupleStore::from_values(samples, 6, 1));
//!
//! let config = KMeansConfig::build().cluster_count(2).rng_seed(1).build();
//! let clusterer = KMeansClusterer::new(tuples, config)?;
//! clusterer.run()?;
//!
//! for cluster in clusterer.get()? {
//!     println!("members {:?} around {:?}", cluster.members(), cluster.centroid());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Example (driving a run from another thread)
//! ```rust
//! use gmeans::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), ClusterError> {
//! let samples: Vec<f64> = (0..1000).map(|i| (i % 10) as f64).collect();
//! let tuples = Arc::new(ArrayTupleStore::from_values(samples, 1000, 1));
//! let config = KMeansConfig::build().cluster_count(4).rng_seed(7).build();
//! let clusterer = Arc::new(KMeansClusterer::new(tuples, config)?);
//!
//! let worker = {
//!     let clusterer = Arc::clone(&clusterer);
//!     std::thread::spawn(move || clusterer.run())
//! };
//! let clusters = clusterer.get()?; // blocks until the run is terminal
//! worker.join().unwrap()?;
//! assert_eq!(clusters.len(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! ## Short API overview
//! [`KMeansClusterer`] runs one refinement pass configured by
//! [`KMeansConfig`]. [`GMeansClusterer`] wraps the adaptive controller
//! configured by [`GMeansConfig`]. Both validate their configuration at
//! construction and expose their [`Task`] for listeners, cancellation and
//! pausing. Tuple datasets can be managed by name through a
//! [`TupleStoreFactory`].

#[macro_use]
mod helpers;
mod cluster;
mod distances;
mod error;
mod gmeans;
mod kmeans;
pub mod math;
mod seeders;
mod task;
mod tuple;

pub use cluster::{Cluster, ClusterStats};
pub use distances::{DistanceMetric, EuclideanDistance};
pub use error::{ClusterError, StorageError};
pub use gmeans::{GMeansClusterer, GMeansConfig, GMeansConfigBuilder};
pub use kmeans::{KMeansClusterer, KMeansConfig, KMeansConfigBuilder};
pub use seeders::{KMeansPlusPlusSeeder, PreassignedSeeder, RandomSeeder, Seeder};
pub use task::{Cancelable, ListenerId, Task, TaskContext, TaskListener, TaskOutcome};
pub use tuple::{
    ArrayTupleStore, FilteredTupleStore, MemoryTupleFactory, TupleStore, TupleStoreFactory,
    TupleStoreMut,
};
