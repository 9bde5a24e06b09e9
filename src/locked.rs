//! Mutex-guarded bounded queue, the correctness/performance baseline.
//!
//! Every operation takes one exclusive lock for its whole critical section.
//! Unlike the lock-free variants this queue is safe for any number of
//! producers and consumers in principle; it is benchmarked in the SPSC
//! configuration as the reference point the lock-free designs are measured
//! against.
//!
//! # Example
//!
//! ```
//! use triq::locked::LockedQueue;
//!
//! let q = LockedQueue::new(4);
//!
//! q.push(1).unwrap();
//! q.push(2).unwrap();
//!
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.pop(), Some(2));
//! assert_eq!(q.pop(), None);
//! ```
//!
//! # Blocking
//!
//! [`pop_blocking`](LockedQueue::pop_blocking) suspends the calling thread
//! on a condition variable until an element is available; a successful
//! [`push`](LockedQueue::push) signals one waiter. There is no timeout and
//! no disconnect signal - a thread blocked on an empty queue that nobody
//! pushes to waits forever.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::{Condvar, Mutex};

use crate::Full;

/// A bounded FIFO queue guarded by a single mutex.
///
/// All methods take `&self`; the lock serializes every access, so the queue
/// can be shared freely behind an `Arc`.
pub struct LockedQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    max_size: usize,
}

impl<T> LockedQueue<T> {
    /// Creates a new queue holding at most `max_size` elements.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max_size)),
            not_empty: Condvar::new(),
            max_size,
        }
    }

    /// Attempts to push a value onto the queue.
    ///
    /// Returns `Err(Full(value))` if the queue already holds `max_size`
    /// elements, giving the value back to the caller. On success, one thread
    /// waiting in [`pop_blocking`](Self::pop_blocking) is woken.
    ///
    /// # Example
    ///
    /// ```
    /// use triq::locked::LockedQueue;
    ///
    /// let q = LockedQueue::new(2);
    ///
    /// assert!(q.push(1).is_ok());
    /// assert!(q.push(2).is_ok());
    /// assert_eq!(q.push(3), Err(triq::Full(3)));
    /// ```
    pub fn push(&self, value: T) -> Result<(), Full<T>> {
        let mut items = self.items.lock();

        if items.len() >= self.max_size {
            return Err(Full(value));
        }

        items.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Attempts to pop a value from the queue without blocking.
    ///
    /// Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Pops a value from the queue, blocking until one is available.
    ///
    /// The lock is released while waiting and re-acquired on wake; the wait
    /// loops on the emptiness check, so spurious wakeups are harmless.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::thread;
    /// use triq::locked::LockedQueue;
    ///
    /// let q = Arc::new(LockedQueue::new(4));
    /// let q2 = Arc::clone(&q);
    ///
    /// let consumer = thread::spawn(move || q2.pop_blocking());
    /// q.push(7).unwrap();
    ///
    /// assert_eq!(consumer.join().unwrap(), 7);
    /// ```
    pub fn pop_blocking(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(value) = items.pop_front() {
                return value;
            }
            self.not_empty.wait(&mut items);
        }
    }

    /// Returns the number of elements currently in the queue.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns `true` if the queue holds `max_size` elements.
    pub fn is_full(&self) -> bool {
        self.items.lock().len() >= self.max_size
    }

    /// Returns the maximum number of elements the queue can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl<T> fmt::Debug for LockedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedQueue")
            .field("capacity", &self.max_size)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
