//! Execution backends: the same per-point selection dispatched three ways.
//!
//! Every backend partitions `0..n` into disjoint, order-preserving units, runs
//! [`fill_rows`](crate::select::fill_rows) for each unit against the read-only
//! dataset, and writes into slots of one [`NeighborTable`] that no other unit
//! touches.

pub mod device;
pub mod process_group;
mod sequential;
mod thread_pool;

pub use device::{DeviceBackend, DeviceConfig};
pub use process_group::ProcessGroupBackend;
pub use sequential::Sequential;
pub use thread_pool::ThreadPoolBackend;

use crate::{Dataset, KnnError, NeighborTable};

/// A strategy for computing the full neighbor table.
///
/// Callers validate `0 < k < dataset.len()` before calling `compute`
/// (see [`crate::KnnConfig::validate`]).
pub trait ExecutionBackend {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Compute every point's `k` nearest neighbors. Blocks until done.
    fn compute(&self, dataset: &Dataset, k: usize) -> Result<NeighborTable, KnnError>;
}

/// Default threads per device block.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Backend selection as plain data (e.g. from the command line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Single-threaded reference.
    Sequential,
    /// Simulated accelerator: one logical thread per point, grouped in blocks.
    Device { threads: usize, block_size: usize },
    /// Fixed pool of OS threads claiming chunks on demand.
    ThreadPool { threads: usize, chunk_size: usize },
    /// Cooperating ranks with private dataset copies, joined by broadcast + gather.
    ProcessGroup { ranks: usize },
}

impl Backend {
    /// Acquire the backend's resources. Failure here is fatal for the run.
    pub fn build(&self) -> Result<Box<dyn ExecutionBackend>, KnnError> {
        Ok(match *self {
            Backend::Sequential => Box::new(Sequential),
            Backend::Device {
                threads,
                block_size,
            } => Box::new(DeviceBackend::new(
                threads,
                DeviceConfig {
                    block_size,
                    ..Default::default()
                },
            )?),
            Backend::ThreadPool {
                threads,
                chunk_size,
            } => Box::new(ThreadPoolBackend::with_chunk_size(threads, chunk_size)?),
            Backend::ProcessGroup { ranks } => Box::new(ProcessGroupBackend::new(ranks)?),
        })
    }
}
