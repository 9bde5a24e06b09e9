//! Lock-free single-producer single-consumer ring buffer.
//!
//! The fastest variant: acquire/release publication on two cursors, no
//! locks, no compare-and-swap anywhere. Capacity must be a power of two and
//! one slot is always kept empty to disambiguate full from empty, so a ring
//! declared with capacity `N` holds at most `N - 1` elements.
//!
//! # Example
//!
//! ```
//! use triq::ring;
//!
//! let (mut producer, mut consumer) = ring::ring_buffer::<u64>(1024);
//!
//! producer.push(1).unwrap();
//! producer.push(2).unwrap();
//!
//! assert_eq!(consumer.pop(), Some(1));
//! assert_eq!(consumer.pop(), Some(2));
//! ```
//!
//! # Synchronization
//!
//! Each side owns one cursor outright. The producer writes a slot and then
//! publishes `tail` with `Release`; a consumer that observes the new `tail`
//! with `Acquire` is guaranteed to observe the slot write that preceded it.
//! The consumer publishes `head` symmetrically. That release/acquire pair is
//! the sole synchronization mechanism. Cursors only ever advance modulo the
//! capacity and slots are overwritten in place, so there is no ABA hazard.
//!
//! Each half caches the other side's cursor and refreshes it with an atomic
//! load only when the queue looks full (producer) or empty (consumer), so
//! the hot path performs a single `Release` store.
//!
//! # Memory Layout
//!
//! One contiguous slot allocation, with `head` and `tail` cache-line padded
//! so that producer and consumer cursor traffic never contends on the same
//! line as each other or the slots.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::Full;

/// Creates a new SPSC ring buffer with the given capacity.
///
/// Returns a `(Producer, Consumer)` pair. `capacity` is the declared slot
/// count; the usable capacity is `capacity - 1` because one slot is kept
/// empty to tell a full ring from an empty one.
///
/// # Panics
///
/// Panics if `capacity` is not a power of two, or is less than 2.
/// Construction is the only place this variant can fail; every operation
/// afterwards returns its outcome as a value.
///
/// # Example
///
/// ```
/// use triq::ring;
///
/// let (mut tx, mut rx) = ring::ring_buffer::<u64>(8);
/// assert_eq!(tx.capacity(), 7);
///
/// tx.push(42).unwrap();
/// assert_eq!(rx.pop(), Some(42));
/// ```
#[must_use]
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(
        capacity.is_power_of_two(),
        "ring capacity must be a power of two"
    );
    assert!(capacity >= 2, "ring capacity must be at least 2");

    let mask = capacity - 1;
    let buffer_ptr = std::mem::ManuallyDrop::new(Vec::<T>::with_capacity(capacity)).as_mut_ptr();
    let inner = Arc::new(Inner {
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
        buffer: buffer_ptr,
        capacity,
        mask,
    });
    let head_atomic = &*inner.head as *const AtomicUsize;
    let tail_atomic = &*inner.tail as *const AtomicUsize;
    (
        Producer {
            local_tail: 0,
            cached_head: 0,
            buffer: buffer_ptr,
            mask,
            tail_atomic,
            head_atomic,
            _inner: Arc::clone(&inner),
        },
        Consumer {
            local_head: 0,
            cached_tail: 0,
            buffer: buffer_ptr,
            mask,
            head_atomic,
            tail_atomic,
            _inner: inner,
        },
    )
}

/// Shared state between producer and consumer.
#[repr(C)]
struct Inner<T> {
    // === Separate cache lines (CachePadded handles this) ===
    /// Consumer's read cursor, in `[0, capacity)`.
    head: CachePadded<AtomicUsize>,
    /// Producer's write cursor, in `[0, capacity)`.
    tail: CachePadded<AtomicUsize>,

    // === Immutable after construction ===
    /// Raw pointer to the slot buffer (owned by the Vec we leaked).
    buffer: *mut T,
    /// Declared capacity (power of two).
    capacity: usize,
    /// Capacity - 1, for modulo via bitwise AND.
    mask: usize,
}

// Safety: the ring buffer is safe to share across threads. Producer and
// Consumer have exclusive write access to their respective cursors and to
// the slots those cursors partition between them.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Drop any remaining elements in [head, tail), mod capacity.
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        let mut idx = head;
        while idx != tail {
            unsafe {
                self.buffer.add(idx).drop_in_place();
            }
            idx = (idx + 1) & self.mask;
        }

        // Reconstruct and drop the Vec to free the allocation.
        unsafe {
            let _ = Vec::from_raw_parts(self.buffer, 0, self.capacity);
        }
    }
}

/// The producer half of an SPSC ring buffer.
///
/// Use [`push`](Producer::push) to add elements. Takes `&mut self` to
/// statically ensure single-producer access.
///
/// This struct can be sent to another thread but cannot be shared
/// (implements `Send` but not `Sync`).
#[repr(C)]
pub struct Producer<T> {
    // === Hot path fields ===
    /// Our write cursor (authoritative).
    local_tail: usize,
    /// Cached copy of the consumer's read cursor.
    cached_head: usize,
    /// Cached buffer pointer - avoids Arc deref on the hot path.
    buffer: *mut T,
    /// Cached mask - avoids Arc deref on the hot path.
    mask: usize,
    /// Pointer to the tail atomic, for publishing.
    tail_atomic: *const AtomicUsize,

    // === Cold path fields ===
    /// Pointer to the head atomic, for refreshing `cached_head`.
    head_atomic: *const AtomicUsize,
    /// Handle to the shared state for cleanup.
    _inner: Arc<Inner<T>>,
}

// Safety: Producer is Send but not Sync - only one thread can use it.
unsafe impl<T: Send> Send for Producer<T> {}

impl<T> Producer<T> {
    /// Attempts to push a value into the ring buffer.
    ///
    /// Returns `Err(Full(value))` if the buffer is full, giving the value
    /// back to the caller with no other side effect. Fullness is expected
    /// steady state; callers retry (spin, yield, or back off) as they see
    /// fit - this variant never blocks.
    ///
    /// # Example
    ///
    /// ```
    /// use triq::ring;
    ///
    /// let (mut producer, _consumer) = ring::ring_buffer::<u32>(4);
    ///
    /// assert!(producer.push(1).is_ok());
    /// assert!(producer.push(2).is_ok());
    /// assert!(producer.push(3).is_ok());
    ///
    /// // Three usable slots: the ring is now full.
    /// assert_eq!(producer.push(4), Err(triq::Full(4)));
    /// ```
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), Full<T>> {
        let tail = self.local_tail;
        let next = (tail + 1) & self.mask;

        if next == self.cached_head {
            // Refresh cache with a synchronizing read of the consumer's cursor.
            let head = unsafe { (*self.head_atomic).load(Ordering::Acquire) };
            self.cached_head = head;
            if next == head {
                return Err(Full(value));
            }
        }

        unsafe {
            self.buffer.add(tail).write(value);
        }

        // Publish: any thread that observes the new tail observes the slot
        // write above.
        unsafe { (*self.tail_atomic).store(next, Ordering::Release) };
        self.local_tail = next;
        Ok(())
    }

    /// Returns the usable capacity of the ring buffer.
    ///
    /// One slot of the declared capacity is always kept empty, so this is
    /// the declared capacity minus one.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Returns the number of elements currently in the buffer.
    ///
    /// Advisory: a snapshot that may be immediately stale while the consumer
    /// is running.
    #[inline]
    pub fn len(&self) -> usize {
        let head = unsafe { (*self.head_atomic).load(Ordering::Relaxed) };
        let tail = unsafe { (*self.tail_atomic).load(Ordering::Relaxed) };
        tail.wrapping_sub(head) & self.mask
    }

    /// Returns `true` if the buffer is empty. Advisory under concurrency.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the buffer is full. Advisory under concurrency.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The consumer half of an SPSC ring buffer.
///
/// Use [`pop`](Consumer::pop) to remove elements in FIFO order. Takes
/// `&mut self` to statically ensure single-consumer access.
///
/// This struct can be sent to another thread but cannot be shared
/// (implements `Send` but not `Sync`).
#[repr(C)]
pub struct Consumer<T> {
    // === Hot path fields ===
    /// Our read cursor (authoritative).
    local_head: usize,
    /// Cached copy of the producer's write cursor.
    cached_tail: usize,
    /// Cached buffer pointer - avoids Arc deref on the hot path.
    buffer: *mut T,
    /// Cached mask - avoids Arc deref on the hot path.
    mask: usize,
    /// Pointer to the head atomic, for publishing.
    head_atomic: *const AtomicUsize,

    // === Cold path fields ===
    /// Pointer to the tail atomic, for refreshing `cached_tail`.
    tail_atomic: *const AtomicUsize,
    /// Handle to the shared state for cleanup.
    _inner: Arc<Inner<T>>,
}

// Safety: Consumer is Send but not Sync - only one thread can use it.
unsafe impl<T: Send> Send for Consumer<T> {}

impl<T> Consumer<T> {
    /// Attempts to pop a value from the ring buffer.
    ///
    /// Returns `None` if the buffer is empty, with no other side effect.
    /// The element is moved out of its slot; the queue never copies.
    ///
    /// # Example
    ///
    /// ```
    /// use triq::ring;
    ///
    /// let (mut producer, mut consumer) = ring::ring_buffer::<u32>(8);
    ///
    /// assert_eq!(consumer.pop(), None);
    ///
    /// producer.push(42).unwrap();
    /// assert_eq!(consumer.pop(), Some(42));
    /// ```
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let head = self.local_head;

        if head == self.cached_tail {
            // Refresh cache with a synchronizing read of the producer's cursor.
            let tail = unsafe { (*self.tail_atomic).load(Ordering::Acquire) };
            self.cached_tail = tail;
            if head == tail {
                return None;
            }
        }

        let value = unsafe { self.buffer.add(head).read() };
        let next = (head + 1) & self.mask;

        // Publish: the producer may now reuse the slot we vacated.
        unsafe { (*self.head_atomic).store(next, Ordering::Release) };
        self.local_head = next;
        Some(value)
    }

    /// Returns the usable capacity of the ring buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask
    }

    /// Returns the number of elements currently in the buffer.
    ///
    /// Advisory: a snapshot that may be immediately stale while the producer
    /// is running.
    #[inline]
    pub fn len(&self) -> usize {
        let head = unsafe { (*self.head_atomic).load(Ordering::Relaxed) };
        let tail = unsafe { (*self.tail_atomic).load(Ordering::Relaxed) };
        tail.wrapping_sub(head) & self.mask
    }

    /// Returns `true` if the buffer is empty. Advisory under concurrency.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the buffer is full. Advisory under concurrency.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
