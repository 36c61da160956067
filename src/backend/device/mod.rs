//! Accelerator-style backend: one logical thread per point, grouped in blocks.
//!
//! The dataset and a zeroed output table are copied into device memory, a
//! single kernel is launched over the grid, and the table is copied back after
//! the launch completes. Both buffers are released when they go out of scope,
//! including on early error returns.

mod kernel;
mod runtime;

pub use runtime::{Device, DeviceBuffer, DeviceConfig, LaunchConfig, LaunchReport};

use kernel::{knn_kernel, KnnKernelArgs};
use runtime::BACKEND;

use super::ExecutionBackend;
use crate::select::SelectScratch;
use crate::timing::{Phase, Timer, TimingBuilder};
use crate::{Dataset, KnnError, NeighborTable};

pub struct DeviceBackend {
    device: Device,
    threads: usize,
}

impl DeviceBackend {
    /// Acquire a device and plan launches of `threads` total threads.
    pub fn new(threads: usize, config: DeviceConfig) -> Result<Self, KnnError> {
        if threads == 0 {
            return Err(KnnError::resource(BACKEND, "thread count must be > 0"));
        }
        Ok(Self {
            device: Device::new(config)?,
            threads,
        })
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[inline]
    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig::for_threads(self.threads, self.device.config().block_size)
    }
}

impl ExecutionBackend for DeviceBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compute(&self, dataset: &Dataset, k: usize) -> Result<NeighborTable, KnnError> {
        let n = dataset.len();
        let scratch_bytes = SelectScratch::bytes_for(n);
        let budget = self.device.config().thread_scratch_bytes;
        if scratch_bytes > budget {
            return Err(KnnError::resource(
                BACKEND,
                format!(
                    "{} points need {} bytes of per-thread scratch, budget is {}",
                    n, scratch_bytes, budget
                ),
            ));
        }

        let mut tb = TimingBuilder::new();
        let launch = self.launch_config();
        if launch.total_threads() < n {
            log::debug!(
                "{}: {} threads for {} points, threads will stride",
                BACKEND,
                launch.total_threads(),
                n
            );
        }

        let t = Timer::start();
        let points = self.device.upload(dataset.as_flat())?;
        let mut out = self.device.alloc_zeroed::<u32>(n * k)?;
        tb.set(Phase::Distribute, t.elapsed());

        let t = Timer::start();
        let args = KnnKernelArgs {
            points: points.as_slice(),
            dim: dataset.dim(),
        };
        let report = self.device.launch(
            launch,
            n,
            &mut out,
            k,
            || SelectScratch::new(n),
            |scratch, item, slot| knn_kernel(&args, scratch, item, slot),
        );
        tb.set(Phase::Compute, t.elapsed());
        log::debug!(
            "{}: grid={} block={} waves={} items={}",
            BACKEND,
            launch.grid_size,
            launch.block_size,
            report.waves,
            report.items
        );

        let t = Timer::start();
        let table = NeighborTable::from_flat(k, out.download());
        tb.set(Phase::Collect, t.elapsed());

        tb.finish().report(BACKEND, n);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Sequential;

    fn spiral(n: usize) -> Dataset {
        let points: Vec<[f64; 3]> = (0..n)
            .map(|i| {
                let t = i as f64 * 0.37;
                [t.cos() * t, t.sin() * t, t * 0.1]
            })
            .collect();
        Dataset::from_points(&points).unwrap()
    }

    #[test]
    fn test_matches_sequential_with_few_and_many_threads() {
        let ds = spiral(50);
        let expected = Sequential.compute(&ds, 4).unwrap();
        for threads in [1, 7, 50, 300] {
            let backend = DeviceBackend::new(
                threads,
                DeviceConfig {
                    block_size: 8,
                    multiprocessors: 3,
                    ..Default::default()
                },
            )
            .unwrap();
            assert_eq!(backend.compute(&ds, 4).unwrap(), expected, "threads={}", threads);
            assert_eq!(backend.device().allocated_bytes(), 0);
        }
    }

    #[test]
    fn test_thread_count_far_beyond_points() {
        let ds = spiral(4);
        let expected = Sequential.compute(&ds, 2).unwrap();
        let backend = DeviceBackend::new(usize::MAX / 2, DeviceConfig::default()).unwrap();
        assert_eq!(backend.compute(&ds, 2).unwrap(), expected);
        assert_eq!(backend.device().allocated_bytes(), 0);
    }

    #[test]
    fn test_scratch_budget_enforced() {
        let ds = spiral(100);
        let backend = DeviceBackend::new(
            128,
            DeviceConfig {
                thread_scratch_bytes: SelectScratch::bytes_for(99),
                ..Default::default()
            },
        )
        .unwrap();
        let err = backend.compute(&ds, 2).unwrap_err();
        assert!(matches!(err, KnnError::ResourceAcquisition { backend: "device", .. }));
    }

    #[test]
    fn test_device_memory_budget_enforced() {
        let ds = spiral(100);
        let backend = DeviceBackend::new(
            128,
            DeviceConfig {
                memory_bytes: ds.as_flat().len() * 8,
                ..Default::default()
            },
        )
        .unwrap();
        // Dataset fits, output table does not; the dataset buffer is released.
        assert!(backend.compute(&ds, 2).is_err());
        assert_eq!(backend.device().allocated_bytes(), 0);
    }
}
