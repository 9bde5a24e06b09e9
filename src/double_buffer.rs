//! Double-buffered SPSC queue with epoch-granular visibility.
//!
//! Two element buffers are owned by the queue for its whole lifetime; only
//! the *role* assigned to each slot changes, so there is no pointer to
//! dangle. A single atomic epoch counter carries all cross-thread state: its
//! value says how many swaps have been published, and its parity says which
//! buffer currently holds the read role (the write role is always the other
//! buffer, so the two can never alias). The consumer keeps its own read
//! cursor and reports each fully-drained epoch back through a second
//! counter; the producer never writes consumer-side state, so the consumer
//! can never observe a half-updated view of an epoch. The producer appends
//! batches to the write buffer and makes a whole batch visible at once by
//! swapping the roles. This trades per-item latency for synchronization
//! frequency: the hot enqueue path touches no atomics at all, and the
//! consumer only sees data at swap boundaries.
//!
//! FIFO order holds *within* an epoch (the elements between two consecutive
//! swaps arrive in enqueue order); ordering across a swap boundary is
//! defined by when the producer chooses to swap, which is caller policy.
//!
//! # Example
//!
//! ```
//! use triq::double_buffer;
//!
//! let (mut producer, mut consumer) = double_buffer::queue::<u64>(16);
//!
//! producer.push(1).unwrap();
//! producer.push(2).unwrap();
//!
//! // Nothing is visible until the producer publishes the batch.
//! assert!(!consumer.has_data());
//!
//! assert!(producer.swap_ready());
//! unsafe { producer.swap_buffers() };
//!
//! assert_eq!(consumer.pop(), Some(1));
//! assert_eq!(consumer.pop(), Some(2));
//! assert_eq!(consumer.pop(), None);
//! ```
//!
//! # The swap hazard
//!
//! [`swap_buffers`](Producer::swap_buffers) clears the buffer that is about
//! to become the new write target - the very buffer the consumer was reading
//! until the swap. The queue provides **no** guard (no generation counter,
//! no handshake, no blocking) against swapping while the consumer is still
//! draining: doing so races the clear against the consumer's in-progress
//! reads of the same buffer. This is a deliberate, caller-enforced
//! invariant, and it is why `swap_buffers` is an
//! `unsafe fn`: the producer must not swap until the consumer has been
//! observed to have drained the current read buffer ([`Consumer::has_data`]
//! returned `false`, or equivalently [`Producer::swap_ready`] returned
//! `true`). Violating the contract is undefined behavior, not a reported
//! error.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::Full;

/// Creates a new double-buffered SPSC queue.
///
/// Returns a `(Producer, Consumer)` pair. Each of the two internal buffers
/// holds at most `max_size` elements, so `max_size` bounds the size of one
/// published batch.
///
/// Elements are taken out of the read buffer by value, which is why the
/// consumer side requires `T: Default` (the vacated slot is left holding a
/// default value until the buffer is cleared at the next swap).
///
/// # Example
///
/// ```
/// use triq::double_buffer;
///
/// let (mut tx, mut rx) = double_buffer::queue::<String>(8);
/// tx.push("hello".to_string()).unwrap();
/// unsafe { tx.swap_buffers() };
/// assert_eq!(rx.pop(), Some("hello".to_string()));
/// ```
#[must_use]
pub fn queue<T>(max_size: usize) -> (Producer<T>, Consumer<T>) {
    let inner = Arc::new(Inner {
        bufs: [
            UnsafeCell::new(Vec::with_capacity(max_size)),
            UnsafeCell::new(Vec::with_capacity(max_size)),
        ],
        epoch: CachePadded::new(AtomicUsize::new(0)),
        drained: CachePadded::new(AtomicUsize::new(0)),
        swapped: AtomicBool::new(false),
        max_size,
    });
    (
        Producer {
            local_role: 0,
            swap_count: 0,
            inner: Arc::clone(&inner),
        },
        Consumer {
            local_epoch: 0,
            local_idx: 0,
            local_len: 0,
            inner,
        },
    )
}

/// Shared state between producer and consumer.
struct Inner<T> {
    /// The two element buffers. At any instant each is exclusively owned by
    /// one role (by convention, not by the type system - see the module docs
    /// on the swap hazard).
    bufs: [UnsafeCell<Vec<T>>; 2],
    /// Number of swaps published so far. The parity selects the read buffer
    /// for the current epoch: epoch `n` reads `bufs[(n & 1) ^ 1]`.
    ///
    /// This is the only word the producer writes on a swap. The consumer's
    /// cursor lives on the consumer side, so a stale load here describes the
    /// previous, fully-drained epoch and simply reports empty - it can never
    /// pair a fresh cursor with a stale buffer selection.
    epoch: CachePadded<AtomicUsize>,
    /// Last epoch the consumer has fully drained. Written by the consumer,
    /// read by the producer's `swap_ready`.
    drained: CachePadded<AtomicUsize>,
    /// Latched by `swap_buffers`, consumed by `buffer_was_swapped`.
    swapped: AtomicBool,
    /// Maximum elements per buffer.
    max_size: usize,
}

// Safety: producer and consumer each touch only the buffer their role
// selects; the epoch and drained words are atomics.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// The producer half of a double-buffered queue.
///
/// Writes batches with [`push`](Producer::push) and publishes them with
/// [`swap_buffers`](Producer::swap_buffers). Takes `&mut self` to statically
/// ensure single-producer access; the swap is producer-only by construction.
pub struct Producer<T> {
    /// Index of our write buffer. We are the sole writer of the epoch word,
    /// so no cross-thread visibility is needed for this read.
    local_role: usize,
    /// Number of swaps we have published, for `swap_ready`.
    swap_count: usize,
    inner: Arc<Inner<T>>,
}

impl<T> Producer<T> {
    /// Attempts to append a value to the current write buffer.
    ///
    /// Returns `Err(Full(value))` if the write buffer already holds
    /// `max_size` elements; the caller decides whether to swap, retry, or
    /// drop the value. The element is not visible to the consumer until the
    /// next [`swap_buffers`](Self::swap_buffers).
    ///
    /// This path touches no atomics.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), Full<T>> {
        let buf = unsafe { &mut *self.inner.bufs[self.local_role].get() };

        if buf.len() >= self.inner.max_size {
            return Err(Full(value));
        }

        buf.push(value);
        Ok(())
    }

    /// Atomically exchanges the write and read roles, publishing the current
    /// write buffer to the consumer.
    ///
    /// The buffer that was being written becomes the new read buffer with
    /// its contents intact; the buffer that was being read is cleared and
    /// becomes the new write target. A consumer that observes the new epoch
    /// observes every element written to the published buffer before the
    /// swap.
    ///
    /// # Safety
    ///
    /// The consumer must have drained the current read buffer before this is
    /// called: [`Consumer::has_data`] must have been observed `false` (or
    /// [`swap_ready`](Self::swap_ready) observed `true`) with no intervening
    /// pops in flight. Otherwise the clear below races the consumer's
    /// in-progress reads of the same buffer - a data race, undefined
    /// behavior, not a reported error. The queue deliberately provides no
    /// internal guard; enforcing the handshake is the caller's job.
    pub unsafe fn swap_buffers(&mut self) {
        let retiring = self.local_role ^ 1;

        // The retiring read buffer becomes the new write target.
        unsafe { (*self.inner.bufs[retiring].get()).clear() };

        // Publish. The release store makes the batch contents visible to a
        // consumer that acquires the new epoch.
        self.swap_count = self.swap_count.wrapping_add(1);
        self.inner.epoch.store(self.swap_count, Ordering::Release);
        self.inner.swapped.store(true, Ordering::Release);

        self.local_role = retiring;
    }

    /// Returns `true` if the consumer has drained the current read buffer,
    /// i.e. the precondition of [`swap_buffers`](Self::swap_buffers) holds.
    ///
    /// An empty published epoch still has to be *observed* by the consumer
    /// (a `pop` returning `None`) before this reports `true` again.
    #[inline]
    pub fn swap_ready(&self) -> bool {
        self.inner.drained.load(Ordering::Acquire) == self.swap_count
    }

    /// Returns the number of elements accumulated in the write buffer.
    #[inline]
    pub fn write_len(&self) -> usize {
        unsafe { (*self.inner.bufs[self.local_role].get()).len() }
    }

    /// Returns `true` if the write buffer has reached `max_size`.
    #[inline]
    pub fn write_is_full(&self) -> bool {
        self.write_len() >= self.inner.max_size
    }

    /// Returns the maximum number of elements per buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.max_size
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("write_len", &self.write_len())
            .finish_non_exhaustive()
    }
}

/// The consumer half of a double-buffered queue.
///
/// Reads the currently published buffer sequentially with
/// [`pop`](Consumer::pop). Takes `&mut self` to statically ensure
/// single-consumer access.
pub struct Consumer<T> {
    /// Last epoch we have adopted from the producer.
    local_epoch: usize,
    /// Cursor into the current read buffer. Never written by the producer.
    local_idx: usize,
    /// Published length of the current read buffer, captured at adoption.
    local_len: usize,
    inner: Arc<Inner<T>>,
}

impl<T: Default> Consumer<T> {
    /// Attempts to pop the next value from the current read buffer.
    ///
    /// Returns `None` once the read cursor reaches the end of the buffer's
    /// published contents; more data arrives only at the producer's next
    /// swap. Within an epoch, values come back in enqueue order.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        if epoch != self.local_epoch {
            // A new epoch was published. The acquire above pairs with the
            // producer's release store, so the buffer contents are visible,
            // and the producer will not touch this buffer again until we
            // report it drained.
            self.local_epoch = epoch;
            self.local_idx = 0;
            self.local_len = unsafe { (*self.inner.bufs[(epoch & 1) ^ 1].get()).len() };
            if self.local_len == 0 {
                self.inner.drained.store(epoch, Ordering::Release);
            }
        }

        if self.local_idx >= self.local_len {
            return None;
        }

        let buf = unsafe { &mut *self.inner.bufs[(self.local_epoch & 1) ^ 1].get() };
        let value = std::mem::take(&mut buf[self.local_idx]);
        self.local_idx += 1;
        if self.local_idx == self.local_len {
            // Our buffer reads above happen-before the producer's next clear.
            self.inner.drained.store(self.local_epoch, Ordering::Release);
        }
        Some(value)
    }
}

impl<T> Consumer<T> {
    /// Returns `true` if unread elements remain in the current read buffer.
    #[inline]
    pub fn has_data(&self) -> bool {
        self.remaining() > 0
    }

    /// Returns the number of unread elements in the current read buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        let epoch = self.inner.epoch.load(Ordering::Acquire);
        if epoch == self.local_epoch {
            self.local_len - self.local_idx
        } else {
            // An epoch we have not adopted yet; nothing of it has been read,
            // and the producer cannot reclaim it until we report it drained.
            unsafe { (*self.inner.bufs[(epoch & 1) ^ 1].get()).len() }
        }
    }

    /// Returns `true` if the producer has swapped since the last call,
    /// consuming the notification.
    #[inline]
    pub fn buffer_was_swapped(&mut self) -> bool {
        self.inner.swapped.swap(false, Ordering::AcqRel)
    }

    /// Returns the maximum number of elements per buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.max_size
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Epoch Visibility
    // ============================================================================

    #[test]
    fn nothing_visible_before_swap() {
        let (mut prod, mut cons) = queue::<u64>(10);

        prod.push(1).unwrap();
        prod.push(2).unwrap();
        prod.push(3).unwrap();

        assert!(!cons.has_data());
        assert_eq!(cons.pop(), None);
        assert_eq!(prod.write_len(), 3);
    }

    #[test]
    fn swap_publishes_batch_in_order() {
        let (mut prod, mut cons) = queue::<u64>(10);

        prod.push(1).unwrap();
        prod.push(2).unwrap();
        prod.push(3).unwrap();

        assert!(prod.swap_ready());
        unsafe { prod.swap_buffers() };

        assert!(cons.has_data());
        assert_eq!(cons.remaining(), 3);

        assert_eq!(cons.pop(), Some(1));
        assert_eq!(cons.pop(), Some(2));
        assert_eq!(cons.pop(), Some(3));
        assert_eq!(cons.pop(), None);
        assert!(!cons.has_data());
    }

    #[test]
    fn multiple_epochs() {
        let (mut prod, mut cons) = queue::<u64>(4);

        for epoch in 0..10u64 {
            for i in 0..4 {
                prod.push(epoch * 4 + i).unwrap();
            }
            assert!(prod.swap_ready());
            unsafe { prod.swap_buffers() };

            for i in 0..4 {
                assert_eq!(cons.pop(), Some(epoch * 4 + i));
            }
            assert_eq!(cons.pop(), None);
        }
    }

    #[test]
    fn empty_swap_publishes_nothing() {
        let (mut prod, mut cons) = queue::<u64>(4);

        unsafe { prod.swap_buffers() };
        assert!(!cons.has_data());
        assert_eq!(cons.pop(), None);

        // Observing the empty epoch reports it drained.
        assert!(prod.swap_ready());
    }

    // ============================================================================
    // Write Buffer Bounds
    // ============================================================================

    #[test]
    fn write_buffer_fills_at_max_size() {
        let (mut prod, _cons) = queue::<u64>(2);

        assert!(prod.push(1).is_ok());
        assert!(prod.push(2).is_ok());
        assert!(prod.write_is_full());

        let err = prod.push(3).unwrap_err();
        assert_eq!(err.into_inner(), 3);

        // Swapping opens a fresh write buffer.
        unsafe { prod.swap_buffers() };
        assert!(!prod.write_is_full());
        assert!(prod.push(3).is_ok());
    }

    #[test]
    fn capacity_reports_per_buffer_bound() {
        let (prod, cons) = queue::<u64>(10);
        assert_eq!(prod.capacity(), 10);
        assert_eq!(cons.capacity(), 10);
    }

    // ============================================================================
    // Swap Notification
    // ============================================================================

    #[test]
    fn swapped_flag_latches_and_clears() {
        let (mut prod, mut cons) = queue::<u64>(4);

        assert!(!cons.buffer_was_swapped());

        prod.push(1).unwrap();
        unsafe { prod.swap_buffers() };

        assert!(cons.buffer_was_swapped());
        assert!(!cons.buffer_was_swapped());
    }

    // ============================================================================
    // Drain Handshake
    // ============================================================================

    #[test]
    fn swap_ready_tracks_consumer_progress() {
        let (mut prod, mut cons) = queue::<u64>(4);

        prod.push(1).unwrap();
        prod.push(2).unwrap();
        unsafe { prod.swap_buffers() };

        assert!(!prod.swap_ready());
        assert_eq!(cons.pop(), Some(1));
        assert!(!prod.swap_ready());
        assert_eq!(cons.pop(), Some(2));
        assert!(prod.swap_ready());
    }

    // ============================================================================
    // Cross-Thread
    // ============================================================================

    #[test]
    fn cross_thread_batched_conservation() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        const COUNT: u64 = 100_000;
        const BATCH: u64 = 64;

        let (mut prod, mut cons) = queue::<u64>(BATCH as usize);
        let done = Arc::new(AtomicBool::new(false));
        let done_clone = Arc::clone(&done);

        let producer = thread::spawn(move || {
            let mut next = 0u64;
            while next < COUNT {
                let end = (next + BATCH).min(COUNT);
                for i in next..end {
                    prod.push(i).unwrap();
                }
                next = end;

                // Honor the documented precondition: never swap an undrained
                // read buffer.
                while !prod.swap_ready() {
                    std::hint::spin_loop();
                }
                unsafe { prod.swap_buffers() };
            }
            // Wait for the final epoch to drain before signaling.
            while !prod.swap_ready() {
                std::hint::spin_loop();
            }
            done_clone.store(true, Ordering::Release);
        });

        let consumer = thread::spawn(move || {
            let mut expected = 0u64;
            loop {
                if let Some(v) = cons.pop() {
                    assert_eq!(v, expected);
                    expected += 1;
                } else if done.load(Ordering::Acquire) && !cons.has_data() {
                    break;
                } else {
                    std::hint::spin_loop();
                }
            }
            expected
        });

        producer.join().unwrap();
        let received = consumer.join().unwrap();
        assert_eq!(received, COUNT);
    }

    // Single-element epochs maximize the swap rate, so every pop sits right
    // at a publication boundary. This is the interleaving where a consumer
    // could pair a stale buffer selection with freshly-reset producer-side
    // state; the epoch/drained protocol must deliver every element anyway.
    #[test]
    fn single_element_epochs_under_rapid_swaps() {
        use std::thread;

        const COUNT: u64 = 1_000_000;

        let (mut prod, mut cons) = queue::<u64>(1);

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                prod.push(i).unwrap();
                while !prod.swap_ready() {
                    std::hint::spin_loop();
                }
                unsafe { prod.swap_buffers() };
            }
            while !prod.swap_ready() {
                std::hint::spin_loop();
            }
        });

        let consumer = thread::spawn(move || {
            let mut expected = 0u64;
            while expected < COUNT {
                if let Some(v) = cons.pop() {
                    assert_eq!(v, expected);
                    expected += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
    }

    // ============================================================================
    // Drop Behavior
    // ============================================================================

    #[test]
    fn undrained_elements_drop_with_queue() {
        use std::sync::atomic::AtomicUsize;

        let drop_count = Arc::new(AtomicUsize::new(0));

        #[derive(Default)]
        struct DropCounter(Option<Arc<AtomicUsize>>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                if let Some(count) = &self.0 {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let (mut prod, cons) = queue::<DropCounter>(8);

        prod.push(DropCounter(Some(Arc::clone(&drop_count)))).unwrap();
        prod.push(DropCounter(Some(Arc::clone(&drop_count)))).unwrap();
        unsafe { prod.swap_buffers() };
        prod.push(DropCounter(Some(Arc::clone(&drop_count)))).unwrap();

        assert_eq!(drop_count.load(Ordering::SeqCst), 0);

        drop(prod);
        drop(cons);

        // Two published but undrained, one still in the write buffer.
        assert_eq!(drop_count.load(Ordering::SeqCst), 3);
    }

    // ============================================================================
    // Special Types
    // ============================================================================

    #[test]
    fn string_messages() {
        let (mut prod, mut cons) = queue::<String>(4);

        prod.push("hello".to_string()).unwrap();
        prod.push("world".to_string()).unwrap();
        unsafe { prod.swap_buffers() };

        assert_eq!(cons.pop(), Some("hello".to_string()));
        assert_eq!(cons.pop(), Some("world".to_string()));
        assert_eq!(cons.pop(), None);
    }

    #[test]
    fn debug_impl() {
        let (prod, cons) = queue::<u64>(4);
        let _ = format!("{prod:?}");
        let _ = format!("{cons:?}");
    }
}
