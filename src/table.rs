//! The global neighbor table: one fixed-length row per dataset point.

/// Neighbor lists for every point, stored row-major.
///
/// Allocated at full size before dispatch and never resized. Backends hand out
/// disjoint row ranges to their workers, so every slot is written exactly once
/// without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTable {
    k: usize,
    indices: Vec<u32>,
}

impl NeighborTable {
    /// A table of `num_points` rows of `k` zeros.
    pub(crate) fn zeroed(num_points: usize, k: usize) -> Self {
        Self {
            k,
            indices: vec![0; num_points * k],
        }
    }

    /// Wrap an already-assembled flat buffer (`num_points * k` entries).
    pub(crate) fn from_flat(k: usize, indices: Vec<u32>) -> Self {
        debug_assert!(k > 0 && indices.len() % k == 0);
        Self { k, indices }
    }

    /// Number of rows (points).
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len() / self.k
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Neighbors kept per point.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Neighbor list of point `i`, nearest first.
    #[inline]
    pub fn row(&self, i: usize) -> &[u32] {
        &self.indices[i * self.k..(i + 1) * self.k]
    }

    /// Iterate rows in point-index order.
    #[inline]
    pub fn rows(&self) -> std::slice::ChunksExact<'_, u32> {
        self.indices.chunks_exact(self.k)
    }

    #[inline]
    pub fn as_flat(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub(crate) fn as_flat_mut(&mut self) -> &mut [u32] {
        &mut self.indices
    }

    pub fn into_flat(self) -> Vec<u32> {
        self.indices
    }
}
