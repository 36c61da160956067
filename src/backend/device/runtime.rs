//! A small SIMT device model: device-local buffers, block/grid launch shape,
//! and a kernel launcher backed by a dedicated worker pool.
//!
//! Blocks are scheduled onto the pool's workers; the threads of a block run in
//! order on whichever worker picked the block up. A launch returns only after
//! every block has finished, which is the device-wide completion barrier.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use rayon::prelude::*;

use crate::KnnError;

pub(super) const BACKEND: &str = "device";

/// Limits of the simulated accelerator.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Threads per block.
    pub block_size: usize,
    /// Largest block the device accepts.
    pub max_threads_per_block: usize,
    /// Workers standing in for multiprocessors. `0` uses the available parallelism.
    pub multiprocessors: usize,
    /// Global memory budget shared by all live buffers.
    pub memory_bytes: usize,
    /// Private scratch each thread may hold (distance row + index permutation).
    pub thread_scratch_bytes: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            block_size: super::super::DEFAULT_BLOCK_SIZE,
            max_threads_per_block: 1024,
            multiprocessors: 0,
            memory_bytes: 4 << 30,
            thread_scratch_bytes: 4 << 20,
        }
    }
}

/// Grid shape for one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_size: usize,
    pub block_size: usize,
}

impl LaunchConfig {
    /// Enough blocks of `block_size` to cover `total_threads`, rounding up.
    pub fn for_threads(total_threads: usize, block_size: usize) -> Self {
        Self {
            grid_size: total_threads.div_ceil(block_size),
            block_size,
        }
    }

    /// Threads in the whole grid, saturating at `usize::MAX`.
    #[inline]
    pub fn total_threads(&self) -> usize {
        self.grid_size.saturating_mul(self.block_size)
    }
}

/// What a launch actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchReport {
    /// Passes of the whole grid over the work items (grid-stride iterations).
    pub waves: usize,
    /// Work items executed; equals the item count of the launch.
    pub items: usize,
}

/// Bytes reserved in device memory; released on drop.
#[derive(Debug)]
struct Allocation {
    bytes: usize,
    in_use: Arc<AtomicUsize>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Device-local copy of a host slice.
#[derive(Debug)]
pub struct DeviceBuffer<T: Pod> {
    data: Vec<T>,
    _alloc: Allocation,
}

impl<T: Pod> DeviceBuffer<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub(super) fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub(super) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy back to the host, releasing the device memory.
    pub fn download(self) -> Vec<T> {
        self.data
    }
}

pub struct Device {
    config: DeviceConfig,
    pool: rayon::ThreadPool,
    in_use: Arc<AtomicUsize>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Result<Self, KnnError> {
        if config.block_size == 0 || config.block_size > config.max_threads_per_block {
            return Err(KnnError::resource(
                BACKEND,
                format!(
                    "block size {} outside 1..={}",
                    config.block_size, config.max_threads_per_block
                ),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.multiprocessors)
            .thread_name(|i| format!("knn-sm-{i}"))
            .build()
            .map_err(|e| KnnError::resource(BACKEND, e.to_string()))?;
        Ok(Self {
            config,
            pool,
            in_use: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Bytes currently held by live buffers.
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    fn reserve(&self, bytes: usize) -> Result<Allocation, KnnError> {
        let limit = self.config.memory_bytes;
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map_err(|used| {
                KnnError::resource(
                    BACKEND,
                    format!(
                        "out of device memory: requested {} bytes with {} of {} in use",
                        bytes, used, limit
                    ),
                )
            })?;
        Ok(Allocation {
            bytes,
            in_use: Arc::clone(&self.in_use),
        })
    }

    /// Copy a host slice into device memory.
    pub fn upload<T: Pod>(&self, host: &[T]) -> Result<DeviceBuffer<T>, KnnError> {
        let alloc = self.reserve(std::mem::size_of_val(host))?;
        Ok(DeviceBuffer {
            data: host.to_vec(),
            _alloc: alloc,
        })
    }

    /// Allocate `len` zeroed elements in device memory.
    pub fn alloc_zeroed<T: Pod>(&self, len: usize) -> Result<DeviceBuffer<T>, KnnError> {
        let alloc = self.reserve(len * std::mem::size_of::<T>())?;
        Ok(DeviceBuffer {
            data: vec![T::zeroed(); len],
            _alloc: alloc,
        })
    }

    /// Run `kernel` once per work item over `items` items.
    ///
    /// Item `i` owns `out[i * slot_len..(i + 1) * slot_len]`. Thread `t` of the
    /// grid handles items `t`, `t + total_threads`, ...; threads whose item
    /// index is past the end do nothing. `init` builds per-block private state
    /// (the threads' scratch). Blocks until all blocks have completed.
    pub fn launch<S, I, F>(
        &self,
        launch: LaunchConfig,
        items: usize,
        out: &mut DeviceBuffer<u32>,
        slot_len: usize,
        init: I,
        kernel: F,
    ) -> LaunchReport
    where
        I: Fn() -> S + Sync + Send,
        F: Fn(&mut S, usize, &mut [u32]) + Sync + Send,
    {
        debug_assert_eq!(out.len(), items * slot_len);
        // Threads past the last item never run, so a wave never spans more than `items`.
        let total = launch.total_threads().min(items);
        let block = launch.block_size;
        let mut waves = 0;
        let mut executed = 0;

        if total == 0 || block == 0 || slot_len == 0 {
            return LaunchReport {
                waves,
                items: executed,
            };
        }

        let out = out.as_mut_slice();
        self.pool.install(|| {
            for (wave, wave_out) in out.chunks_mut(total * slot_len).enumerate() {
                let wave_base = wave * total;
                let count: usize = wave_out
                    .par_chunks_mut(block.saturating_mul(slot_len))
                    .enumerate()
                    .map_init(&init, |state, (block_idx, block_out)| {
                        let mut ran = 0;
                        for thread_idx in 0..block {
                            let local = thread_idx * slot_len;
                            if local >= block_out.len() {
                                break;
                            }
                            let item = wave_base + block_idx * block + thread_idx;
                            if item >= items {
                                break;
                            }
                            kernel(state, item, &mut block_out[local..local + slot_len]);
                            ran += 1;
                        }
                        ran
                    })
                    .sum();
                executed += count;
                waves += 1;
            }
        });

        LaunchReport {
            waves,
            items: executed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device(memory_bytes: usize) -> Device {
        Device::new(DeviceConfig {
            block_size: 4,
            multiprocessors: 2,
            memory_bytes,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_grid_rounds_up() {
        let cfg = LaunchConfig::for_threads(1000, 256);
        assert_eq!(cfg.grid_size, 4);
        assert_eq!(cfg.total_threads(), 1024);
        assert_eq!(LaunchConfig::for_threads(256, 256).grid_size, 1);
    }

    #[test]
    fn test_memory_released_on_drop() {
        let device = small_device(1 << 20);
        {
            let a = device.upload(&[1.0f64, 2.0, 3.0]).unwrap();
            let _b = device.alloc_zeroed::<u32>(10).unwrap();
            assert_eq!(device.allocated_bytes(), 24 + 40);
            assert_eq!(a.download(), vec![1.0, 2.0, 3.0]);
            assert_eq!(device.allocated_bytes(), 40);
        }
        assert_eq!(device.allocated_bytes(), 0);
    }

    #[test]
    fn test_out_of_memory() {
        let device = small_device(64);
        let _a = device.alloc_zeroed::<u32>(10).unwrap();
        let err = device.alloc_zeroed::<u32>(10).unwrap_err();
        assert!(matches!(err, KnnError::ResourceAcquisition { .. }));
        assert_eq!(device.allocated_bytes(), 40);
    }

    #[test]
    fn test_oversized_block_rejected() {
        let cfg = DeviceConfig {
            block_size: 2048,
            ..Default::default()
        };
        assert!(Device::new(cfg).is_err());
    }

    #[test]
    fn test_launch_bounds_guard() {
        let device = small_device(1 << 20);
        let mut out = device.alloc_zeroed::<u32>(10).unwrap();
        // 3 blocks of 4 threads for 10 items: two threads idle.
        let report = device.launch(
            LaunchConfig::for_threads(10, 4),
            10,
            &mut out,
            1,
            || (),
            |_, item, slot| slot[0] = item as u32 + 1,
        );
        assert_eq!(report, LaunchReport { waves: 1, items: 10 });
        assert_eq!(out.download(), (1..=10).collect::<Vec<u32>>());
    }

    #[test]
    fn test_launch_grid_stride() {
        let device = small_device(1 << 20);
        let mut out = device.alloc_zeroed::<u32>(22).unwrap();
        // 4 threads, 11 items of 2 slots: three waves.
        let report = device.launch(
            LaunchConfig::for_threads(4, 4),
            11,
            &mut out,
            2,
            || (),
            |_, item, slot| {
                slot[0] = item as u32;
                slot[1] = item as u32 * 10;
            },
        );
        assert_eq!(report.waves, 3);
        assert_eq!(report.items, 11);
        let flat = out.download();
        for item in 0..11u32 {
            assert_eq!(&flat[item as usize * 2..item as usize * 2 + 2], &[item, item * 10]);
        }
    }

    #[test]
    fn test_total_threads_saturates() {
        let cfg = LaunchConfig::for_threads(usize::MAX / 2, 256);
        assert_eq!(cfg.total_threads(), usize::MAX);
    }

    #[test]
    fn test_launch_with_huge_grid() {
        let device = small_device(1 << 20);
        let mut out = device.alloc_zeroed::<u32>(12).unwrap();
        let report = device.launch(
            LaunchConfig::for_threads(usize::MAX / 2, 4),
            6,
            &mut out,
            2,
            || (),
            |_, item, slot| {
                slot[0] = item as u32;
                slot[1] = item as u32 + 100;
            },
        );
        assert_eq!(report, LaunchReport { waves: 1, items: 6 });
        let flat = out.download();
        for item in 0..6u32 {
            assert_eq!(&flat[item as usize * 2..item as usize * 2 + 2], &[item, item + 100]);
        }
    }
}
