//! Framed messages exchanged between ranks.
//!
//! Frame layout: one tag byte, two little-endian `u64` header words, then the
//! payload as raw element bytes. Payload bytes are in native endianness, so
//! peers must run on the same host (which spawned worker processes always do).
//!
//! | tag | header          | payload            |
//! |-----|-----------------|--------------------|
//! | 1   | points, dim     | `points * dim` f64 |
//! | 2   | rank, entries   | `entries` u32      |

use std::io::{self, Read, Write};

use crate::{Dataset, KnnError};

const TAG_DATASET: u8 = 1;
const TAG_BLOCK: u8 = 2;

/// Largest payload a frame may announce (guards against corrupt headers).
const MAX_PAYLOAD_BYTES: u64 = 1 << 40;

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Full dataset, sent from rank 0 to every other rank.
    Dataset(Dataset),
    /// One rank's slice of the neighbor table, sent to rank 0.
    Block { rank: usize, data: Vec<u32> },
}

pub fn write_message<W: Write>(w: &mut W, msg: &Message) -> io::Result<()> {
    match msg {
        Message::Dataset(ds) => write_dataset(w, ds),
        Message::Block { rank, data } => write_block(w, *rank, data),
    }
}

pub fn write_dataset<W: Write>(w: &mut W, ds: &Dataset) -> io::Result<()> {
    write_header(w, TAG_DATASET, ds.len() as u64, ds.dim() as u64)?;
    w.write_all(bytemuck::cast_slice(ds.as_flat()))?;
    w.flush()
}

pub fn write_block<W: Write>(w: &mut W, rank: usize, data: &[u32]) -> io::Result<()> {
    write_header(w, TAG_BLOCK, rank as u64, data.len() as u64)?;
    w.write_all(bytemuck::cast_slice(data))?;
    w.flush()
}

fn write_header<W: Write>(w: &mut W, tag: u8, a: u64, b: u64) -> io::Result<()> {
    let mut header = [0u8; 17];
    header[0] = tag;
    header[1..9].copy_from_slice(&a.to_le_bytes());
    header[9..17].copy_from_slice(&b.to_le_bytes());
    w.write_all(&header)
}

pub fn read_message<R: Read>(r: &mut R) -> Result<Message, KnnError> {
    let mut header = [0u8; 17];
    r.read_exact(&mut header).map_err(transport)?;
    let a = u64::from_le_bytes(header[1..9].try_into().unwrap_or_default());
    let b = u64::from_le_bytes(header[9..17].try_into().unwrap_or_default());

    match header[0] {
        TAG_DATASET => {
            let dim = usize::try_from(b).map_err(|_| bad_frame("dimension overflows usize"))?;
            let len = checked_len(a, b, std::mem::size_of::<f64>())?;
            let mut coords = vec![0f64; len];
            r.read_exact(bytemuck::cast_slice_mut(coords.as_mut_slice()))
                .map_err(transport)?;
            Ok(Message::Dataset(Dataset::from_flat(coords, dim)?))
        }
        TAG_BLOCK => {
            let rank = usize::try_from(a).map_err(|_| bad_frame("rank overflows usize"))?;
            let len = checked_len(b, 1, std::mem::size_of::<u32>())?;
            let mut data = vec![0u32; len];
            r.read_exact(bytemuck::cast_slice_mut(data.as_mut_slice()))
                .map_err(transport)?;
            Ok(Message::Block { rank, data })
        }
        tag => Err(bad_frame(&format!("unknown tag {}", tag))),
    }
}

fn checked_len(a: u64, b: u64, elem: usize) -> Result<usize, KnnError> {
    a.checked_mul(b)
        .filter(|&len| len.saturating_mul(elem as u64) <= MAX_PAYLOAD_BYTES)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| bad_frame("payload length out of range"))
}

fn transport(e: io::Error) -> KnnError {
    KnnError::Transport(format!("peer stream: {}", e))
}

fn bad_frame(what: &str) -> KnnError {
    KnnError::Transport(format!("malformed frame: {}", what))
}
