//! The per-thread neighbor kernel.

use crate::select::{neighbors_in, SelectScratch};

/// Read-only kernel arguments living in device memory.
pub(super) struct KnnKernelArgs<'a> {
    pub points: &'a [f64],
    pub dim: usize,
}

/// Body of one logical device thread: the neighbor list of point `item`.
#[inline]
pub(super) fn knn_kernel(
    args: &KnnKernelArgs<'_>,
    scratch: &mut SelectScratch,
    item: usize,
    slot: &mut [u32],
) {
    neighbors_in(args.points, args.dim, item, scratch, slot);
}
