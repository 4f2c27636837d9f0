//! One-to-many, snapshot-on-emit fan-out (component G).
//!
//! Grounded in `mt/mt-signal.c`. Connect/disconnect build a fresh immutable
//! target vector under a short mutex (pruning dead targets as they go —
//! the only place targets are garbage collected, per `spec.md` §4.6); emit
//! takes a refcounted snapshot of that vector, drops the mutex immediately,
//! then iterates it without ever blocking a concurrent mutator or being
//! blocked by one.

use crate::object::WeakData;

use std::sync::{Arc, Mutex};

/// How a connected target should receive an emitted payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeliveryMode {
    /// Direct call if the target is on the emitting thread's queue,
    /// otherwise enqueued. The common case.
    Auto,
    /// Always a direct call; the target must guarantee it is safe to call
    /// from any emitting thread.
    Direct,
    /// Always enqueued, even when the target shares the emitter's queue.
    Proxied,
}

type Delegate<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Target<T> {
    delegate: Delegate<T>,
    weak_data: Arc<WeakData>,
    mode: DeliveryMode,
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        Target {
            delegate: Arc::clone(&self.delegate),
            weak_data: Arc::clone(&self.weak_data),
            mode: self.mode,
        }
    }
}

/// A multi-target emitter for payloads of type `T`.
///
/// `connect`/`disconnect` publish a new `Arc<Vec<Target<T>>>` under
/// `targets`'s mutex; `emit` clones that `Arc` (an O(1), lock-free-for-
/// readers snapshot) and releases the lock before invoking anything, so a
/// delegate that re-enters `connect`/`disconnect` on the same signal cannot
/// deadlock (see `spec.md` §9, "Open question — signal ordering during
/// re-entrant emit": it keeps observing the snapshot it started with).
pub struct Signal<T> {
    targets: Mutex<Arc<Vec<Target<T>>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal {
            targets: Mutex::new(Arc::new(Vec::new())),
        }
    }
}

impl<T: Send + Sync + 'static> Signal<T> {
    pub fn new() -> Signal<T> {
        Signal::default()
    }

    /// Connects a delegate bound to `weak_data`, delivered per `mode`.
    /// Builds a new target vector, dropping (not carrying forward) any
    /// existing target whose object has since died — the in-line GC pass
    /// described in `spec.md` §4.6.
    pub fn connect<F>(&self, weak_data: Arc<WeakData>, mode: DeliveryMode, delegate: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut guard = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        let mut next: Vec<Target<T>> = guard
            .iter()
            .filter(|t| t.weak_data.is_alive())
            .cloned()
            .collect();
        next.push(Target {
            delegate: Arc::new(delegate),
            weak_data,
            mode,
        });
        *guard = Arc::new(next);
    }

    /// Connects an existing [`crate::pipe::Pipe`]'s binding as a target.
    /// Returns `false` (and connects nothing) if the pipe is unbound.
    pub fn connect_pipe(&self, pipe: &crate::pipe::Pipe<T>, mode: DeliveryMode) -> bool
    where
        T: Clone,
    {
        let Some(weak_data) = pipe.weak_data() else {
            return false;
        };
        let weak_data = Arc::clone(weak_data);
        // `Pipe` doesn't expose its delegate directly (it's private to keep
        // `send`/`send_proxied`/`send_direct` the only call sites), so the
        // connection re-derives delivery through the pipe's own `send`
        // methods, which already implement every mode's semantics.
        let pipe = pipe.clone();
        self.connect(weak_data, mode, move |payload: &T| match mode {
            DeliveryMode::Direct => pipe.send_direct(payload.clone()),
            DeliveryMode::Proxied => pipe.send_proxied(payload.clone()),
            DeliveryMode::Auto => pipe.send(payload.clone()),
        });
        true
    }

    /// Removes every target whose weak data is `weak_data` (by pointer
    /// identity), along with any already-dead targets found along the way.
    pub fn disconnect(&self, weak_data: &Arc<WeakData>) {
        let mut guard = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_empty() {
            return;
        }

        let next: Vec<Target<T>> = guard
            .iter()
            .filter(|t| t.weak_data.is_alive() && !Arc::ptr_eq(&t.weak_data, weak_data))
            .cloned()
            .collect();

        *guard = Arc::new(next);
    }

    /// Takes a snapshot of the current targets and delivers `payload` to
    /// each live one, in connection order. Targets connected after this
    /// call started are not visited; targets connected before it are
    /// always visited (the *Signal snapshot stability* property, `spec.md`
    /// §8).
    pub fn emit(&self, payload: T) {
        let snapshot = Arc::clone(&self.targets.lock().unwrap_or_else(|e| e.into_inner()));
        let current = crate::message::current_queue();

        let mut payload = Some(payload);
        let mut shared: Option<Arc<T>> = None;

        for target in snapshot.iter() {
            if !target.weak_data.is_alive() {
                continue;
            }

            let same_queue = current
                .as_ref()
                .is_some_and(|cur| Arc::ptr_eq(cur, target.weak_data.queue()));
            let direct = target.mode == DeliveryMode::Direct
                || (target.mode == DeliveryMode::Auto && same_queue);

            if direct {
                match &shared {
                    Some(arc) => (target.delegate)(arc),
                    None => (target.delegate)(payload.as_ref().expect("payload already moved")),
                }
            } else {
                // Lazily move the payload into a shared `Arc` the first
                // time a proxied delivery is needed — a signal connected
                // entirely to same-thread targets never allocates one,
                // and a signal fanning out cross-thread allocates exactly
                // once regardless of how many proxied targets it has
                // (`spec.md` §4.6's stated rationale for lazy sizing).
                let arc = shared.get_or_insert_with(|| {
                    Arc::new(payload.take().expect("payload already moved"))
                });

                let delegate = Arc::clone(&target.delegate);
                let payload_arc = Arc::clone(arc);
                let node = crate::message::Node::new(
                    Arc::clone(&target.weak_data),
                    Box::new(move || delegate(&payload_arc)),
                );
                let _ = target.weak_data.queue().produce(node);
            }
        }
    }
}
