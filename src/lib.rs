//! Brute-force k-nearest neighbors for every point of an in-memory dataset.
//!
//! Each point's neighbors come from a full pass over the dataset under
//! Euclidean distance, followed by a partial selection sort. The same per-point
//! routine is dispatched by interchangeable [`ExecutionBackend`]s:
//!
//! - [`DeviceBackend`]: accelerator-style grid of blocks, one logical thread per point
//! - [`ThreadPoolBackend`]: fixed pool of OS threads claiming chunks on demand
//! - [`ProcessGroupBackend`]: ranks with private dataset copies, broadcast + gather
//! - [`Sequential`]: single-threaded reference
//!
//! All backends produce identical tables for the same dataset and `k`.
//!
//! # Example
//!
//! ```
//! use brute_knn::{compute, Dataset};
//!
//! let points = Dataset::from_points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]])
//!     .expect("points share a dimension");
//! let output = compute(&points, 2).expect("2 < 4 points");
//! assert_eq!(output.table.row(0), &[1, 2]);
//! ```
//!
//! # Self-exclusion
//!
//! After sorting, the nearest entry is assumed to be the query itself and is
//! dropped without checking. With coincident points that entry may be a twin,
//! in which case the query's own index appears in its list; see [`select`].

pub mod backend;
pub mod dataset;
pub mod distance;
mod error;
pub mod partition;
pub mod report;
pub mod select;
mod table;
mod timing;

use std::time::{Duration, Instant};

pub use backend::{
    Backend, DeviceBackend, DeviceConfig, ExecutionBackend, ProcessGroupBackend, Sequential,
    ThreadPoolBackend,
};
pub use dataset::{load_csv, read_records, Dataset, LoadOptions};
pub use error::KnnError;
pub use table::NeighborTable;

/// Neighbors kept per point when none is configured.
pub const DEFAULT_K: usize = 3;

/// Run parameters checked against the loaded data before dispatch.
#[derive(Debug, Clone)]
pub struct KnnConfig {
    /// Neighbors kept per point. Must satisfy `0 < k < dataset.len()`.
    pub k: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

impl KnnConfig {
    pub fn validate(&self, dataset: &Dataset) -> Result<(), KnnError> {
        let n = dataset.len();
        if n == 0 {
            return Err(KnnError::InvalidDataset("dataset is empty".into()));
        }
        if n > u32::MAX as usize {
            return Err(KnnError::InvalidDataset(format!(
                "{} points exceed the u32 index range",
                n
            )));
        }
        if self.k == 0 || self.k >= n {
            return Err(KnnError::InvalidConfig(format!(
                "k = {} needs 0 < k < {} (number of points)",
                self.k, n
            )));
        }
        Ok(())
    }
}

/// A computed neighbor table and how long the backend took.
#[derive(Debug, Clone)]
pub struct KnnOutput {
    pub table: NeighborTable,
    /// Wall time of the backend dispatch alone: data distribution, compute and
    /// collection. Loading, validation and backend construction are excluded.
    pub elapsed: Duration,
    pub backend: &'static str,
}

/// Compute with the thread-pool backend sized to the available parallelism.
pub fn compute(dataset: &Dataset, k: usize) -> Result<KnnOutput, KnnError> {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let backend = ThreadPoolBackend::new(threads)?;
    compute_with(dataset, &KnnConfig { k }, &backend)
}

/// Validate `config` against `dataset`, then run `backend` and time it.
pub fn compute_with(
    dataset: &Dataset,
    config: &KnnConfig,
    backend: &dyn ExecutionBackend,
) -> Result<KnnOutput, KnnError> {
    config.validate(dataset)?;
    log::debug!(
        "{}: n={} dim={} k={}",
        backend.name(),
        dataset.len(),
        dataset.dim(),
        config.k
    );

    let t0 = Instant::now();
    let table = backend.compute(dataset, config.k)?;
    let elapsed = t0.elapsed();

    debug_assert_eq!(table.len(), dataset.len());
    Ok(KnnOutput {
        table,
        elapsed,
        backend: backend.name(),
    })
}
