//! # triq
//!
//! Three bounded single-producer single-consumer (SPSC) queue strategies,
//! built for comparing synchronization designs against each other:
//!
//! - [`ring`] — lock-free ring buffer. Two cache-padded cursors, one slot
//!   kept empty, acquire/release publication, no CAS on any path. Lowest
//!   per-item latency.
//! - [`locked`] — mutex-guarded baseline with a condvar-backed blocking
//!   dequeue. The correctness/performance reference point.
//! - [`double_buffer`] — two buffers with an atomically published role
//!   selector. The producer writes a whole batch, then makes it visible with
//!   one swap. Trades per-item latency for synchronization frequency.
//!
//! ## Design Goals
//!
//! - No allocations after construction (ring and double buffer)
//! - Cache-line isolation to prevent false sharing
//! - Non-blocking operations return immediately; retry policy (spin, yield,
//!   back off) belongs to the caller
//! - Full/empty are steady-state signals, not errors
//!
//! ## Example
//!
//! ```
//! use triq::ring;
//!
//! let (mut tx, mut rx) = ring::ring_buffer::<u64>(1024);
//!
//! tx.push(1).unwrap();
//! tx.push(2).unwrap();
//!
//! assert_eq!(rx.pop(), Some(1));
//! assert_eq!(rx.pop(), Some(2));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;

pub mod double_buffer;
pub mod locked;
pub mod ring;

/// Error returned by a failed push when the queue (or the current write
/// buffer) is full.
///
/// Contains the value that could not be pushed, allowing the caller to retry
/// or handle the value differently. Fullness is an expected steady-state
/// signal, not a fault.
///
/// # Example
///
/// ```
/// use triq::ring;
///
/// let (mut tx, _rx) = ring::ring_buffer::<u32>(2);
///
/// tx.push(1).unwrap();
///
/// // One slot is kept empty, so a capacity-2 ring holds a single element.
/// let err = tx.push(2).unwrap_err();
/// assert_eq!(err.into_inner(), 2);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Full").finish_non_exhaustive()
    }
}

impl<T> std::error::Error for Full<T> {}
