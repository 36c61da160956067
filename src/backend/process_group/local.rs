//! In-process rank group over channels.
//!
//! Star topology: rank 0 holds a sender to every other rank's inbox, and every
//! other rank holds a sender to rank 0's inbox only. No rank can reach its own
//! inbox, so once the peers feeding it are gone a blocked receive fails
//! instead of hanging.

use std::sync::mpsc::{channel, Receiver, Sender};

use super::wire::Message;
use super::Communicator;
use crate::partition::GatherLayout;
use crate::{Dataset, KnnError};

/// Factory for a connected set of [`LocalComm`]s.
pub struct LocalGroup;

impl LocalGroup {
    /// Create `size` connected endpoints, indexed by rank.
    pub fn connect(size: usize) -> Vec<LocalComm> {
        let (senders, inboxes): (Vec<Sender<Message>>, Vec<Receiver<Message>>) =
            (0..size).map(|_| channel()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                rank,
                size,
                inbox,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, tx)| {
                        let linked = peer != rank && (rank == 0 || peer == 0);
                        linked.then(|| tx.clone())
                    })
                    .collect(),
            })
            .collect()
    }
}

/// One rank's endpoint in a [`LocalGroup`].
pub struct LocalComm {
    rank: usize,
    size: usize,
    inbox: Receiver<Message>,
    peers: Vec<Option<Sender<Message>>>,
}

impl LocalComm {
    fn send(&self, to: usize, msg: Message) -> Result<(), KnnError> {
        self.peers[to]
            .as_ref()
            .ok_or_else(|| {
                KnnError::Transport(format!("rank {} has no link to rank {}", self.rank, to))
            })?
            .send(msg)
            .map_err(|_| KnnError::Transport(format!("rank {} hung up", to)))
    }

    fn recv(&self) -> Result<Message, KnnError> {
        self.inbox.recv().map_err(|_| {
            KnnError::Transport(format!("rank {}: every peer hung up", self.rank))
        })
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, dataset: Option<Dataset>) -> Result<Dataset, KnnError> {
        if self.rank == 0 {
            let dataset = dataset
                .ok_or_else(|| KnnError::InvalidConfig("rank 0 must supply the dataset".into()))?;
            for peer in 1..self.size {
                self.send(peer, Message::Dataset(dataset.clone()))?;
            }
            return Ok(dataset);
        }
        match self.recv()? {
            Message::Dataset(ds) => Ok(ds),
            Message::Block { .. } => Err(KnnError::Transport(
                "expected dataset broadcast, got a result block".into(),
            )),
        }
    }

    fn gather(
        &mut self,
        local: &[u32],
        layout: &GatherLayout,
    ) -> Result<Option<Vec<u32>>, KnnError> {
        if self.rank != 0 {
            self.send(
                0,
                Message::Block {
                    rank: self.rank,
                    data: local.to_vec(),
                },
            )?;
            return Ok(None);
        }

        let mut table = vec![0u32; layout.total()];
        layout.place(0, local, &mut table)?;
        let mut seen = vec![false; self.size];
        seen[0] = true;
        for _ in 1..self.size {
            match self.recv()? {
                Message::Block { rank, data } => {
                    if seen.get(rank).copied().unwrap_or(false) {
                        return Err(KnnError::Transport(format!(
                            "duplicate block from rank {}",
                            rank
                        )));
                    }
                    layout.place(rank, &data, &mut table)?;
                    seen[rank] = true;
                }
                Message::Dataset(_) => {
                    return Err(KnnError::Transport(
                        "expected result block, got a dataset".into(),
                    ))
                }
            }
        }
        Ok(Some(table))
    }
}
