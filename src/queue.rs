//! A single-consumer, multi-producer intrusive FIFO queue.
//!
//! This is the lock-free fabric underneath [`crate::message`]: any thread may
//! [`Queue::produce`] a node, but only the thread that owns the queue may
//! [`Queue::consume`] from it. Producers never block each other and never
//! block the consumer.
//!
//! The algorithm is the classic two-pointer (`first`/`last`) intrusive MPSC
//! queue: a producer swaps `last` then links the previous tail, and the
//! consumer walks from `first` one link at a time, falling back to a
//! compare-and-swap against `last` when it catches up to the tail. See
//! [`Queue::consume`] for the race this resolves.

use std::sync::atomic::{AtomicPtr, Ordering};

/// A node that can be linked into a [`Queue`].
///
/// # Safety
///
/// Implementors must return a stable reference to the same `AtomicPtr` for
/// the lifetime of the node; the queue uses it as the intrusive link.
pub(crate) unsafe trait Link: Sized {
    fn next(&self) -> &AtomicPtr<Self>;
}

/// Padding to keep the producer-side and consumer-side pointers off the same
/// cache line; under heavy concurrent `produce` traffic this avoids false
/// sharing with the consumer's reads of `first`.
#[repr(align(128))]
struct CachePadded<T>(T);

/// Multi-producer, single-consumer intrusive queue of `*mut T`.
///
/// Nodes are raw pointers rather than owned `Box<T>` because ownership of a
/// produced node transfers to whoever consumes it; the queue itself never
/// allocates or frees.
pub(crate) struct Queue<T: Link> {
    first: CachePadded<AtomicPtr<T>>,
    last: CachePadded<AtomicPtr<T>>,
}

// Safety: all access to the shared pointers goes through atomic operations;
// `T` crossing threads is gated on `T: Send` same as `std::sync::mpsc`.
unsafe impl<T: Link + Send> Send for Queue<T> {}
unsafe impl<T: Link + Send> Sync for Queue<T> {}

impl<T: Link> Queue<T> {
    pub(crate) const fn new() -> Queue<T> {
        Queue {
            first: CachePadded(AtomicPtr::new(std::ptr::null_mut())),
            last: CachePadded(AtomicPtr::new(std::ptr::null_mut())),
        }
    }

    /// Appends `node` to the tail of the queue. Safe to call from any thread,
    /// concurrently with other `produce` calls and with `consume`.
    ///
    /// # Safety
    ///
    /// `node` must be a valid, uniquely-owned pointer that is not already
    /// linked into this or any other queue; ownership of it passes to the
    /// queue until a `consume` call returns it.
    pub(crate) unsafe fn produce(&self, node: *mut T) {
        unsafe {
            (*node).next().store(std::ptr::null_mut(), Ordering::Relaxed);
        }

        let prev = self.last.0.swap(node, Ordering::AcqRel);

        if prev.is_null() {
            self.first.0.store(node, Ordering::Release);
        } else {
            unsafe {
                (*prev).next().store(node, Ordering::Release);
            }
        }
    }

    /// Removes and returns the node at the head of the queue, or `None` if
    /// the queue is empty (or momentarily appears so, see below).
    ///
    /// Must only be called from the single consuming thread.
    ///
    /// A producer that has swapped itself into `last` but has not yet linked
    /// the previous tail's `next` pointer creates a window where `consume`
    /// cannot find a path from `first` to `last`. Rather than spin waiting
    /// for that producer, `consume` treats the queue as empty and leaves
    /// `first` untouched so a later call can retry; the item is never lost,
    /// only delayed.
    pub(crate) fn consume(&self) -> Option<*mut T> {
        let first = self.first.0.load(Ordering::Acquire);

        if first.is_null() {
            return None;
        }

        let next = unsafe { (*first).next().load(Ordering::Acquire) };

        if !next.is_null() {
            self.first.0.store(next, Ordering::Release);
            return Some(first);
        }

        if self
            .last
            .0
            .compare_exchange(first, std::ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.first.0.store(std::ptr::null_mut(), Ordering::Release);
            return Some(first);
        }

        None
    }

    #[cfg(test)]
    fn is_empty_for_test(&self) -> bool {
        self.first.0.load(Ordering::SeqCst).is_null() && self.last.0.load(Ordering::SeqCst).is_null()
    }
}
