//! Rank group of real OS processes connected by standard-stream pipes.
//!
//! Rank 0 spawns ranks `1..size` as child processes and holds one pipe pair
//! per child. Children learn their rank and the group size from environment
//! variables, read frames from stdin and write frames to stdout. Anything a
//! child wants to log must go to stderr.

use std::ffi::OsString;
use std::io::{BufReader, BufWriter, Stdin, Stdout};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use super::wire::{read_message, write_block, write_dataset, Message};
use super::{Communicator, BACKEND};
use crate::partition::GatherLayout;
use crate::{Dataset, KnnError};

/// Environment variable carrying a child's rank.
pub const RANK_ENV: &str = "BRUTE_KNN_RANK";
/// Environment variable carrying the group size.
pub const SIZE_ENV: &str = "BRUTE_KNN_SIZE";

struct Link {
    rank: usize,
    child: Child,
    input: Option<BufWriter<ChildStdin>>,
    output: BufReader<ChildStdout>,
}

/// Rank 0's side of a process group.
///
/// Dropping the group closes every child's stdin and reaps the children. If
/// the group never completed a gather, children are killed first so a failed
/// run does not leave orphans behind.
pub struct PipeGroup {
    size: usize,
    links: Vec<Link>,
    completed: bool,
}

impl PipeGroup {
    /// Spawn `size - 1` copies of `program args...` as ranks `1..size`.
    pub fn spawn(program: &Path, args: &[OsString], size: usize) -> Result<Self, KnnError> {
        if size == 0 {
            return Err(KnnError::resource(BACKEND, "group needs at least one rank"));
        }
        let mut group = Self {
            size,
            links: Vec::with_capacity(size - 1),
            completed: false,
        };
        for rank in 1..size {
            let mut child = Command::new(program)
                .args(args)
                .env(RANK_ENV, rank.to_string())
                .env(SIZE_ENV, size.to_string())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| {
                    KnnError::resource(
                        BACKEND,
                        format!("spawning rank {} ({}): {}", rank, program.display(), e),
                    )
                })?;
            let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
                let _ = child.kill();
                let _ = child.wait();
                return Err(KnnError::resource(
                    BACKEND,
                    format!("rank {} has no stdio pipes", rank),
                ));
            };
            group.links.push(Link {
                rank,
                child,
                input: Some(BufWriter::new(stdin)),
                output: BufReader::new(stdout),
            });
        }
        log::debug!("{}: spawned {} worker processes", BACKEND, size - 1);
        Ok(group)
    }

    /// Reap every child and check that each exited cleanly.
    pub fn finish(mut self) -> Result<(), KnnError> {
        let mut failed = Vec::new();
        for mut link in std::mem::take(&mut self.links) {
            drop(link.input.take());
            match link.child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => failed.push(format!("rank {} exited with {}", link.rank, status)),
                Err(e) => failed.push(format!("rank {}: {}", link.rank, e)),
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(KnnError::Transport(failed.join("; ")))
        }
    }
}

impl Drop for PipeGroup {
    fn drop(&mut self) {
        for link in &mut self.links {
            drop(link.input.take());
            if !self.completed {
                let _ = link.child.kill();
            }
            if let Err(e) = link.child.wait() {
                log::warn!("{}: could not reap rank {}: {}", BACKEND, link.rank, e);
            }
        }
    }
}

impl Communicator for PipeGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, dataset: Option<Dataset>) -> Result<Dataset, KnnError> {
        let dataset = dataset
            .ok_or_else(|| KnnError::InvalidConfig("rank 0 must supply the dataset".into()))?;
        for link in &mut self.links {
            let input = link.input.as_mut().ok_or_else(|| {
                KnnError::Transport(format!("rank {} input already closed", link.rank))
            })?;
            write_dataset(input, &dataset).map_err(|e| {
                KnnError::Transport(format!("broadcast to rank {}: {}", link.rank, e))
            })?;
        }
        Ok(dataset)
    }

    fn gather(
        &mut self,
        local: &[u32],
        layout: &GatherLayout,
    ) -> Result<Option<Vec<u32>>, KnnError> {
        let mut table = vec![0u32; layout.total()];
        layout.place(0, local, &mut table)?;
        for link in &mut self.links {
            match read_message(&mut link.output)? {
                Message::Block { rank, data } if rank == link.rank => {
                    layout.place(rank, &data, &mut table)?;
                }
                Message::Block { rank, .. } => {
                    return Err(KnnError::Transport(format!(
                        "pipe of rank {} carried a block from rank {}",
                        link.rank, rank
                    )))
                }
                Message::Dataset(_) => {
                    return Err(KnnError::Transport(format!(
                        "rank {} sent a dataset instead of its block",
                        link.rank
                    )))
                }
            }
        }
        self.completed = true;
        Ok(Some(table))
    }
}

/// A child rank's side of a process group, speaking over its own stdin/stdout.
pub struct PipeWorker {
    rank: usize,
    size: usize,
    input: BufReader<Stdin>,
    output: BufWriter<Stdout>,
}

impl PipeWorker {
    /// Join the group this process was spawned into by [`PipeGroup::spawn`].
    pub fn from_env() -> Result<Self, KnnError> {
        let read = |name: &str| -> Result<usize, KnnError> {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| {
                    KnnError::InvalidConfig(format!("{} is missing or not a number", name))
                })
        };
        let rank = read(RANK_ENV)?;
        let size = read(SIZE_ENV)?;
        if rank == 0 || rank >= size {
            return Err(KnnError::InvalidConfig(format!(
                "worker rank {} outside 1..{}",
                rank, size
            )));
        }
        Ok(Self {
            rank,
            size,
            input: BufReader::new(std::io::stdin()),
            output: BufWriter::new(std::io::stdout()),
        })
    }
}

impl Communicator for PipeWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, _dataset: Option<Dataset>) -> Result<Dataset, KnnError> {
        match read_message(&mut self.input)? {
            Message::Dataset(ds) => Ok(ds),
            Message::Block { .. } => Err(KnnError::Transport(
                "expected dataset broadcast, got a result block".into(),
            )),
        }
    }

    fn gather(
        &mut self,
        local: &[u32],
        _layout: &GatherLayout,
    ) -> Result<Option<Vec<u32>>, KnnError> {
        write_block(&mut self.output, self.rank, local)
            .map_err(|e| KnnError::Transport(format!("sending block to rank 0: {}", e)))?;
        Ok(None)
    }
}
