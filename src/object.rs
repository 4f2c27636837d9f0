//! Object identity and weak-reference safety across threads (component E).
//!
//! An [`Affiliation`] is what an application's object type embeds (as a
//! field, the way a `mtrt` source embeds a raw fd) to pin itself to the
//! message queue it was constructed on. [`WeakData`] is the small, freely
//! shareable record that [`crate::pipe::Pipe`] and [`crate::signal::Signal`]
//! hold onto instead of a direct reference to the object, so that the
//! object's destruction — which may race an in-flight cross-thread message
//! — never leaves a dangling pointer.
//!
//! Grounded in `mt/object.c`'s `MT_Object`/`MT_WeakData` pair. The two
//! reference counts that file tracks separately — `ref` ("any reference at
//! all") and `msg_ref` ("references that expect the queue to still exist")
//! — collapse into a single `Arc<WeakData>` strong count here: `WeakData`
//! itself holds the `Arc<QueueHandle>`, so the queue's strong reference is
//! released exactly when the last `Arc<WeakData>` (object's own, or any
//! in-flight message's) drops. See `DESIGN.md` for why this is equivalent
//! rather than a simplification that drops a guarantee.

use crate::message::{self, QueueHandle};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The shared identity record behind an object, usable after the object
/// itself has been destroyed.
///
/// `alive` is the Rust analog of `MT_WeakData::object`: it transitions
/// exactly once, from `true` to `false`, when the owning [`Affiliation`] is
/// dropped, and never back (the *Weak-data monotonicity* property in
/// `spec.md` §8).
pub struct WeakData {
    alive: AtomicBool,
    queue: Arc<QueueHandle>,
}

impl WeakData {
    /// Whether the object this weak data points to is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn queue(&self) -> &Arc<QueueHandle> {
        &self.queue
    }

    /// `MT_IsSynchronous`: true iff the calling thread's current queue is
    /// this weak data's affiliated queue, i.e. a delivery to it can be made
    /// by direct call instead of enqueuing.
    pub fn is_synchronous(&self) -> bool {
        message::current_queue().is_some_and(|cur| Arc::ptr_eq(&cur, &self.queue))
    }
}

/// Pins an object to the message queue it was constructed on.
///
/// Application types embed an `Affiliation` the way they would embed any
/// other non-`Copy`, drop-significant field. Dropping it nulls the
/// [`WeakData`] back-pointer, matching `MT_DestroyObject`; in debug builds
/// this also checks the invariant that destruction happens on the
/// affiliated queue's own thread.
pub struct Affiliation {
    weak: Arc<WeakData>,
}

impl Affiliation {
    /// Affiliates with an explicit queue (used when an object is
    /// deliberately constructed for another thread's queue, e.g. during
    /// [`crate::thread::Thread::begin_init`]/`end_init`).
    pub fn new(queue: Arc<QueueHandle>) -> Affiliation {
        Affiliation {
            weak: Arc::new(WeakData {
                alive: AtomicBool::new(true),
                queue,
            }),
        }
    }

    /// Affiliates with the calling thread's current queue, auto-creating
    /// one if this thread has never needed one before.
    pub fn current() -> io::Result<Affiliation> {
        Ok(Self::new(message::current_or_create_queue()?))
    }

    /// The weak data other threads and other objects should hold instead of
    /// a direct reference to this object. Cheap to call repeatedly; the
    /// same underlying record is returned every time.
    pub fn weak_ref(&self) -> Arc<WeakData> {
        Arc::clone(&self.weak)
    }

    /// The queue this object is pinned to.
    pub fn queue(&self) -> &Arc<QueueHandle> {
        self.weak.queue()
    }

    /// Equivalent to `self.weak_ref().is_synchronous()`.
    pub fn is_synchronous(&self) -> bool {
        self.weak.is_synchronous()
    }
}

impl Drop for Affiliation {
    fn drop(&mut self) {
        debug_assert!(
            self.weak.is_synchronous(),
            "object destroyed on a thread other than its affiliated queue's"
        );
        self.weak.mark_dead();
    }
}
