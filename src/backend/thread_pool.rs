//! Shared-memory backend on a fixed-size rayon pool.
//!
//! The table is cut into chunks of `chunk_size` rows. Each chunk is its own
//! rayon task, so idle workers steal whatever is left rather than following a
//! static assignment. Workers share the dataset by reference and write only
//! their chunk's rows.

use rayon::prelude::*;

use super::ExecutionBackend;
use crate::select::{fill_rows, SelectScratch};
use crate::timing::{Phase, Timer, TimingBuilder};
use crate::{Dataset, KnnError, NeighborTable};

const BACKEND: &str = "thread-pool";

pub struct ThreadPoolBackend {
    pool: rayon::ThreadPool,
    chunk_size: usize,
}

impl ThreadPoolBackend {
    /// A pool of exactly `threads` workers claiming one point at a time.
    pub fn new(threads: usize) -> Result<Self, KnnError> {
        Self::with_chunk_size(threads, 1)
    }

    pub fn with_chunk_size(threads: usize, chunk_size: usize) -> Result<Self, KnnError> {
        if threads == 0 {
            return Err(KnnError::resource(BACKEND, "thread count must be > 0"));
        }
        if chunk_size == 0 {
            return Err(KnnError::resource(BACKEND, "chunk size must be > 0"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("knn-worker-{i}"))
            .build()
            .map_err(|e| KnnError::resource(BACKEND, e.to_string()))?;
        Ok(Self { pool, chunk_size })
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl ExecutionBackend for ThreadPoolBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compute(&self, dataset: &Dataset, k: usize) -> Result<NeighborTable, KnnError> {
        let n = dataset.len();
        let mut tb = TimingBuilder::new();
        let mut table = NeighborTable::zeroed(n, k);
        // A chunk never needs more rows than the table has.
        let rows_per_chunk = self.chunk_size.min(n.max(1));
        log::debug!(
            "{}: {} points over {} threads, {} rows per chunk",
            BACKEND,
            n,
            self.num_threads(),
            rows_per_chunk
        );

        let t = Timer::start();
        self.pool.install(|| {
            table
                .as_flat_mut()
                .par_chunks_mut(rows_per_chunk * k)
                .with_max_len(1)
                .enumerate()
                .for_each_init(
                    || SelectScratch::new(n),
                    |scratch, (chunk, out)| {
                        fill_rows(dataset, k, chunk * rows_per_chunk, out, scratch);
                    },
                );
        });
        tb.set(Phase::Compute, t.elapsed());

        tb.finish().report(BACKEND, n);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Sequential;

    fn line_dataset(n: usize) -> Dataset {
        let points: Vec<[f64; 2]> = (0..n)
            .map(|i| {
                let x = i as f64;
                [x * x * 0.01, (x * 0.7).sin()]
            })
            .collect();
        Dataset::from_points(&points).unwrap()
    }

    #[test]
    fn test_matches_sequential_across_chunk_sizes() {
        let ds = line_dataset(37);
        let expected = Sequential.compute(&ds, 3).unwrap();
        for chunk in [1, 4, 10, 100] {
            let backend = ThreadPoolBackend::with_chunk_size(3, chunk).unwrap();
            assert_eq!(backend.compute(&ds, 3).unwrap(), expected, "chunk={}", chunk);
        }
    }

    #[test]
    fn test_pool_size_is_exact() {
        let backend = ThreadPoolBackend::new(5).unwrap();
        assert_eq!(backend.num_threads(), 5);
    }

    #[test]
    fn test_zero_chunk_rejected() {
        assert!(ThreadPoolBackend::with_chunk_size(2, 0).is_err());
    }

    #[test]
    fn test_chunk_larger_than_table() {
        let ds = line_dataset(6);
        let expected = Sequential.compute(&ds, 2).unwrap();
        let backend = ThreadPoolBackend::with_chunk_size(2, usize::MAX).unwrap();
        assert_eq!(backend.compute(&ds, 2).unwrap(), expected);
    }
}
