//! Distributed backend: cooperating ranks with no shared memory.
//!
//! Rank 0 starts with the dataset and broadcasts a full copy to every rank,
//! since each point's neighbors depend on the whole dataset. Each rank then
//! computes only its contiguous slice ([`rank_range`]) and all ranks gather
//! their slices into rank 0's table in rank order. Those two collectives are
//! the only coordination.
//!
//! The collectives are abstracted by [`Communicator`]. [`LocalGroup`] runs
//! ranks as threads joined by channels; [`PipeGroup`] runs them as separate OS
//! processes talking over their standard streams.

mod local;
mod pipe;
pub mod wire;

pub use local::{LocalComm, LocalGroup};
pub use pipe::{PipeGroup, PipeWorker, RANK_ENV, SIZE_ENV};

use super::ExecutionBackend;
use crate::partition::{rank_range, GatherLayout};
use crate::select::{fill_rows, SelectScratch};
use crate::timing::{Phase, Timer, TimingBuilder};
use crate::{Dataset, KnnError, NeighborTable};

const BACKEND: &str = "process-group";

/// Collective operations among a fixed group of ranks.
///
/// Every rank must call each collective, in the same order; a call blocks
/// until the peers it depends on have arrived.
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// One-to-all broadcast from rank 0. Rank 0 passes `Some`, others `None`;
    /// every rank gets back its own copy.
    fn broadcast(&mut self, dataset: Option<Dataset>) -> Result<Dataset, KnnError>;

    /// All-to-one gather into rank 0 following `layout`. Returns the
    /// concatenated buffer on rank 0 and `None` elsewhere.
    fn gather(&mut self, local: &[u32], layout: &GatherLayout)
        -> Result<Option<Vec<u32>>, KnnError>;
}

/// Run one rank's share of the computation: broadcast, local slice, gather.
///
/// Returns the full table on rank 0 and `None` on every other rank.
pub fn run_rank<C: Communicator + ?Sized>(
    comm: &mut C,
    dataset: Option<Dataset>,
    k: usize,
) -> Result<Option<NeighborTable>, KnnError> {
    let (rank, size) = (comm.rank(), comm.size());
    let mut tb = TimingBuilder::new();

    let t = Timer::start();
    let dataset = comm.broadcast(dataset)?;
    tb.set(Phase::Distribute, t.elapsed());

    let n = dataset.len();
    if k == 0 || k >= n {
        return Err(KnnError::InvalidConfig(format!(
            "rank {}: k = {} needs 0 < k < {}",
            rank, k, n
        )));
    }

    let t = Timer::start();
    let range = rank_range(rank, size, n);
    log::debug!("{}: rank {}/{} owns points {:?}", BACKEND, rank, size, range);
    let mut local = vec![0u32; range.len() * k];
    let mut scratch = SelectScratch::new(n);
    fill_rows(&dataset, k, range.start, &mut local, &mut scratch);
    tb.set(Phase::Compute, t.elapsed());

    let t = Timer::start();
    let layout = GatherLayout::new(size, n, k);
    let gathered = comm.gather(&local, &layout)?;
    tb.set(Phase::Collect, t.elapsed());

    if rank == 0 {
        tb.finish().report(BACKEND, n);
    }
    Ok(gathered.map(|flat| NeighborTable::from_flat(k, flat)))
}

/// Runs `ranks` ranks as threads of this process, each with a private
/// dataset copy delivered by broadcast.
pub struct ProcessGroupBackend {
    ranks: usize,
}

impl ProcessGroupBackend {
    pub fn new(ranks: usize) -> Result<Self, KnnError> {
        if ranks == 0 {
            return Err(KnnError::resource(BACKEND, "group needs at least one rank"));
        }
        Ok(Self { ranks })
    }

    #[inline]
    pub fn ranks(&self) -> usize {
        self.ranks
    }
}

impl ExecutionBackend for ProcessGroupBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn compute(&self, dataset: &Dataset, k: usize) -> Result<NeighborTable, KnnError> {
        let mut comms = LocalGroup::connect(self.ranks).into_iter();
        let Some(mut root) = comms.next() else {
            return Err(KnnError::resource(BACKEND, "group needs at least one rank"));
        };

        std::thread::scope(|s| {
            let mut workers = Vec::with_capacity(self.ranks - 1);
            for mut comm in comms {
                let handle = std::thread::Builder::new()
                    .name(format!("knn-rank-{}", comm.rank()))
                    .spawn_scoped(s, move || run_rank(&mut comm, None, k).map(|_| ()))
                    .map_err(|e| KnnError::resource(BACKEND, e.to_string()))?;
                workers.push(handle);
            }

            let root_result = run_rank(&mut root, Some(dataset.clone()), k);
            // Unblocks any rank still waiting on the broadcast.
            drop(root);

            for handle in workers {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(KnnError::Transport("a rank panicked".into())),
                }
            }

            root_result?.ok_or_else(|| KnnError::Transport("rank 0 gathered nothing".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Sequential;

    fn grid(side: usize) -> Dataset {
        let points: Vec<[f64; 2]> = (0..side * side)
            .map(|i| [(i % side) as f64 * 1.1, (i / side) as f64 + (i as f64 * 0.013)])
            .collect();
        Dataset::from_points(&points).unwrap()
    }

    #[test]
    fn test_matches_sequential_for_uneven_splits() {
        let ds = grid(7); // 49 points
        let expected = Sequential.compute(&ds, 3).unwrap();
        for ranks in [1, 2, 3, 5, 8] {
            let backend = ProcessGroupBackend::new(ranks).unwrap();
            assert_eq!(backend.compute(&ds, 3).unwrap(), expected, "ranks={}", ranks);
        }
    }

    #[test]
    fn test_more_ranks_than_points() {
        let ds = grid(2);
        let expected = Sequential.compute(&ds, 1).unwrap();
        let backend = ProcessGroupBackend::new(6).unwrap();
        assert_eq!(backend.compute(&ds, 1).unwrap(), expected);
    }

    #[test]
    fn test_invalid_k_fails_every_rank_without_hanging() {
        let ds = grid(2);
        let backend = ProcessGroupBackend::new(3).unwrap();
        assert!(matches!(
            backend.compute(&ds, 4),
            Err(KnnError::InvalidConfig(_))
        ));
    }
}
