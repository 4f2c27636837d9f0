//! One-to-one typed channel bound to a receiver's affiliated queue
//! (component F).
//!
//! Grounded in the `MT_Pipe(T)` macro family and `MT_BaseSend`/
//! `MT_BaseSendProxied` in `mt/message-queue.c`. The original packs a
//! `(function pointer, opaque receiver)` delegate plus a type descriptor
//! `{size, copy-constructor, destructor}`; per the REDESIGN FLAGS in
//! `spec.md` §9 ("Delegate type-erasure → closures or typed channel
//! structs"), `Pipe<T>` is monomorphized over its payload type instead, with
//! an ordinary boxed closure standing in for the delegate and `T`'s own
//! `Drop` standing in for the destructor.

use crate::message::Node;
use crate::object::WeakData;

use std::fmt;
use std::sync::Arc;

type Delegate<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Binding<T> {
    delegate: Delegate<T>,
    weak_data: Arc<WeakData>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Binding {
            delegate: Arc::clone(&self.delegate),
            weak_data: Arc::clone(&self.weak_data),
        }
    }
}

/// A value-type, freely copyable handle that delivers payloads of type `T`
/// to whatever receiver it was last [`Pipe::bind`]-ed to.
///
/// An unbound pipe silently drops every send, matching `MT_BaseSend`'s
/// `weak_data == NULL` case (a default-constructed pipe in the original has
/// no target yet).
pub struct Pipe<T> {
    binding: Option<Binding<T>>,
}

impl<T> Clone for Pipe<T> {
    fn clone(&self) -> Self {
        Pipe {
            binding: self.binding.clone(),
        }
    }
}

impl<T> fmt::Debug for Pipe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipe")
            .field("bound", &self.binding.is_some())
            .finish()
    }
}

impl<T> Default for Pipe<T> {
    fn default() -> Self {
        Pipe { binding: None }
    }
}

impl<T: Send + Sync + 'static> Pipe<T> {
    /// An unbound pipe; every send is a no-op until [`Pipe::bind`] is called.
    pub fn new() -> Pipe<T> {
        Pipe::default()
    }

    /// Binds (or rebinds) this pipe to a receiver, capturing its weak data.
    /// Replacing an existing binding simply drops the old `Arc`s — there is
    /// no separate refcount decrement step as in the original's manual
    /// `MT_Ref`/`MT_Deref`.
    pub fn bind<F>(&mut self, weak_data: Arc<WeakData>, delegate: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.binding = Some(Binding {
            delegate: Arc::new(delegate),
            weak_data,
        });
    }

    /// Clears any existing binding; subsequent sends are no-ops.
    pub fn unbind(&mut self) {
        self.binding = None;
    }

    /// Whether this pipe currently has a live binding.
    pub fn is_bound(&self) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.weak_data.is_alive())
    }

    pub(crate) fn weak_data(&self) -> Option<&Arc<WeakData>> {
        self.binding.as_ref().map(|b| &b.weak_data)
    }

    /// `auto` send: direct call if the receiver is on the caller's queue,
    /// otherwise enqueued. Silently dropped if unbound or the receiver is
    /// dead. Mirrors `MT_BaseSend`.
    pub fn send(&self, payload: T) {
        let Some(binding) = &self.binding else {
            return;
        };
        if !binding.weak_data.is_alive() {
            return;
        }

        if binding.weak_data.is_synchronous() {
            (binding.delegate)(&payload);
        } else {
            self.enqueue(binding, payload);
        }
    }

    /// `proxied` send: always enqueued, even when the receiver is on the
    /// caller's own queue. Mirrors `MT_BaseSendProxied`.
    pub fn send_proxied(&self, payload: T) {
        let Some(binding) = &self.binding else {
            return;
        };
        if !binding.weak_data.is_alive() {
            return;
        }
        self.enqueue(binding, payload);
    }

    /// `direct` send: always a direct call, never enqueued. Mirrors the
    /// `MT_SEND_DIRECT` delivery mode.
    pub fn send_direct(&self, payload: T) {
        let Some(binding) = &self.binding else {
            return;
        };
        if !binding.weak_data.is_alive() {
            return;
        }
        (binding.delegate)(&payload);
    }

    fn enqueue(&self, binding: &Binding<T>, payload: T) {
        let delegate = Arc::clone(&binding.delegate);
        let node = Node::new(
            Arc::clone(&binding.weak_data),
            Box::new(move || delegate(&payload)),
        );
        // An enqueue failure here means the waker syscall itself failed;
        // the node has already been handed to the queue and will still be
        // drained on the next successful wake or turn, so there is nothing
        // further to propagate to the sender.
        let _ = binding.weak_data.queue().produce(node);
    }
}
