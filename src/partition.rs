//! Work partitioning for the process-group backend and the matching gather layout.
//!
//! Ranks own contiguous, rank-ordered point ranges. Concatenating per-rank
//! blocks in rank order therefore reproduces global point order; any change to
//! `rank_range` must keep ranges contiguous and monotonically increasing.

use std::ops::Range;

use crate::KnnError;

/// Points owned by `rank` out of `size` ranks: `[rank*n/size, (rank+1)*n/size)`.
///
/// The remainder of `n / size` is spread over the higher ranks; every index in
/// `0..n` belongs to exactly one rank.
#[inline]
pub fn rank_range(rank: usize, size: usize, n: usize) -> Range<usize> {
    debug_assert!(size > 0 && rank < size);
    let split = |r: usize| ((r as u128 * n as u128) / size as u128) as usize;
    split(rank)..split(rank + 1)
}

/// Per-rank receive counts and displacements (in table entries, not points).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherLayout {
    pub counts: Vec<usize>,
    pub displs: Vec<usize>,
    total: usize,
}

impl GatherLayout {
    pub fn new(size: usize, n: usize, k: usize) -> Self {
        let mut counts = Vec::with_capacity(size);
        let mut displs = Vec::with_capacity(size);
        let mut sum = 0;
        for rank in 0..size {
            let count = rank_range(rank, size, n).len() * k;
            counts.push(count);
            displs.push(sum);
            sum += count;
        }
        Self {
            counts,
            displs,
            total: sum,
        }
    }

    /// Entries in the fully gathered table.
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Copy `rank`'s block into its slot of `dest`.
    pub fn place(&self, rank: usize, block: &[u32], dest: &mut [u32]) -> Result<(), KnnError> {
        let Some(&count) = self.counts.get(rank) else {
            return Err(KnnError::Transport(format!(
                "block from unknown rank {} (group size {})",
                rank,
                self.counts.len()
            )));
        };
        if block.len() != count {
            return Err(KnnError::Transport(format!(
                "rank {} sent {} entries, expected {}",
                rank,
                block.len(),
                count
            )));
        }
        let start = self.displs[rank];
        dest[start..start + count].copy_from_slice(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        let ranges: Vec<_> = (0..4).map(|r| rank_range(r, 4, 100)).collect();
        assert_eq!(ranges, vec![0..25, 25..50, 50..75, 75..100]);
    }

    #[test]
    fn test_uneven_split() {
        let ranges: Vec<_> = (0..3).map(|r| rank_range(r, 3, 10)).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
    }

    #[test]
    fn test_more_ranks_than_points() {
        let lens: Vec<usize> = (0..5).map(|r| rank_range(r, 5, 2).len()).collect();
        assert_eq!(lens.iter().sum::<usize>(), 2);
    }

    #[test]
    fn test_layout_matches_ranges() {
        let layout = GatherLayout::new(3, 10, 2);
        assert_eq!(layout.counts, vec![6, 6, 8]);
        assert_eq!(layout.displs, vec![0, 6, 12]);
        assert_eq!(layout.total(), 20);
    }

    #[test]
    fn test_place_rejects_wrong_length() {
        let layout = GatherLayout::new(2, 4, 1);
        let mut dest = vec![0u32; 4];
        assert!(layout.place(1, &[9], &mut dest).is_err());
        layout.place(1, &[7, 8], &mut dest).unwrap();
        assert_eq!(dest, vec![0, 0, 7, 8]);
    }
}
