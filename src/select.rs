//! Per-point neighbor selection: the one algorithm every backend runs.
//!
//! For each query the full distance row is computed, then a partial selection
//! sort orders only the `k + 1` smallest entries. Sorted slot 0 is assumed to
//! be the query itself and is dropped without checking; the next `k` slots are
//! the result.
//!
//! The self-skip is only right when no other point coincides with the query.
//! With duplicates, slot 0 may hold the lower-indexed twin, and the query's own
//! index then shows up in its neighbor list. That behavior is kept as-is.
//!
//! Ties are resolved by scan order: a later entry replaces the current best only
//! when strictly smaller. Because passes swap entries around, this is not a
//! stable order across equal distances.

use crate::distance::euclidean;
use crate::Dataset;

/// Reusable per-worker buffers for one distance row and its index permutation.
///
/// Sized at runtime to the dataset, allocated once per worker and reused for
/// every query that worker handles.
#[derive(Debug, Clone, Default)]
pub struct SelectScratch {
    dists: Vec<f64>,
    order: Vec<u32>,
}

impl SelectScratch {
    pub fn new(num_points: usize) -> Self {
        Self {
            dists: Vec::with_capacity(num_points),
            order: Vec::with_capacity(num_points),
        }
    }

    /// Bytes one scratch needs for a dataset of `num_points`.
    #[inline]
    pub fn bytes_for(num_points: usize) -> usize {
        num_points * (std::mem::size_of::<f64>() + std::mem::size_of::<u32>())
    }
}

/// Select the `out.len()` nearest entries of `dists`, skipping sorted slot 0.
///
/// `order` is working storage and is overwritten. Requires `out.len() < dists.len()`.
pub fn select_nearest(dists: &[f64], order: &mut Vec<u32>, out: &mut [u32]) {
    let n = dists.len();
    let k = out.len();
    debug_assert!(k < n, "k must be smaller than the number of points");

    order.clear();
    order.extend(0..n as u32);

    for m in 0..=k {
        let mut best = m;
        let mut best_dist = dists[order[m] as usize];
        for j in (m + 1)..n {
            let d = dists[order[j] as usize];
            if d < best_dist {
                best = j;
                best_dist = d;
            }
        }
        order.swap(m, best);
    }

    out.copy_from_slice(&order[1..=k]);
}

/// Compute the neighbor list of point `query` into `out` (length `k`).
#[inline]
pub fn neighbors_of(dataset: &Dataset, query: usize, scratch: &mut SelectScratch, out: &mut [u32]) {
    neighbors_in(dataset.as_flat(), dataset.dim(), query, scratch, out);
}

/// [`neighbors_of`] over a raw row-major coordinate buffer.
pub(crate) fn neighbors_in(
    coords: &[f64],
    dim: usize,
    query: usize,
    scratch: &mut SelectScratch,
    out: &mut [u32],
) {
    let q = &coords[query * dim..(query + 1) * dim];
    scratch.dists.clear();
    scratch
        .dists
        .extend(coords.chunks_exact(dim).map(|p| euclidean(q, p)));
    select_nearest(&scratch.dists, &mut scratch.order, out);
}

/// Fill consecutive rows of a neighbor table starting at point `first`.
///
/// `out` holds `out.len() / k` rows of `k` entries each.
pub fn fill_rows(
    dataset: &Dataset,
    k: usize,
    first: usize,
    out: &mut [u32],
    scratch: &mut SelectScratch,
) {
    debug_assert!(out.len() % k == 0);
    for (offset, row) in out.chunks_exact_mut(k).enumerate() {
        neighbors_of(dataset, first + offset, scratch, row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_orders_ascending() {
        let dists = [0.0, 4.0, 1.0, 3.0, 2.0];
        let mut order = Vec::new();
        let mut out = [0u32; 3];
        select_nearest(&dists, &mut order, &mut out);
        assert_eq!(out, [2, 4, 3]);
    }

    #[test]
    fn test_select_skips_slot_zero_even_if_not_first() {
        // Query at index 3; its zero distance is sorted into slot 0 and dropped.
        let dists = [5.0, 1.0, 2.0, 0.0];
        let mut order = Vec::new();
        let mut out = [0u32; 2];
        select_nearest(&dists, &mut order, &mut out);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn test_select_tie_keeps_first_scanned() {
        let dists = [0.0, 1.0, 1.0, 1.0];
        let mut order = Vec::new();
        let mut out = [0u32; 1];
        select_nearest(&dists, &mut order, &mut out);
        assert_eq!(out, [1]);
    }

    #[test]
    fn test_select_k_equals_n_minus_one() {
        let dists = [3.0, 0.0, 2.0, 1.0];
        let mut order = Vec::new();
        let mut out = [0u32; 3];
        select_nearest(&dists, &mut order, &mut out);
        assert_eq!(out, [3, 2, 0]);
    }

    #[test]
    fn test_fill_rows_offsets_queries() {
        let ds = Dataset::from_points(&[[0.0], [1.0], [3.0], [7.0]]).unwrap();
        let mut scratch = SelectScratch::new(ds.len());
        let mut out = [0u32; 2];
        fill_rows(&ds, 1, 2, &mut out, &mut scratch);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn test_scratch_bytes() {
        assert_eq!(SelectScratch::bytes_for(10), 120);
    }
}
