//! Zero-cost phase timing for the execution backends.
//!
//! When the `timing` feature is enabled, backends record how long they spend
//! moving data in, computing, and moving results out, and print the split to
//! stderr. When disabled, all types become zero-sized and all methods compile away.

/// Coarse phases shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Device upload or dataset broadcast.
    Distribute,
    /// Neighbor selection for every owned point.
    Compute,
    /// Device download or result gather.
    Collect,
}

#[cfg(feature = "timing")]
mod real;
#[cfg(not(feature = "timing"))]
mod stub;

#[cfg(feature = "timing")]
pub use real::*;
#[cfg(not(feature = "timing"))]
pub use stub::*;
