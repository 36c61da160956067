//! Single-threaded reference backend.

use super::ExecutionBackend;
use crate::select::{fill_rows, SelectScratch};
use crate::{Dataset, KnnError, NeighborTable};

/// Processes every point in index order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl ExecutionBackend for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn compute(&self, dataset: &Dataset, k: usize) -> Result<NeighborTable, KnnError> {
        let n = dataset.len();
        let mut table = NeighborTable::zeroed(n, k);
        let mut scratch = SelectScratch::new(n);
        fill_rows(dataset, k, 0, table.as_flat_mut(), &mut scratch);
        Ok(table)
    }
}
