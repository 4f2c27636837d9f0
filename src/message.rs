//! Cross-thread message delivery: the queue handle any [`crate::object`]
//! affiliates with, and the per-thread [`MessageQueue`] that owns both the
//! consuming side of that queue and the [`crate::eventloop::EventLoop`] that
//! drains it.
//!
//! This is component D of the runtime: it wraps the intrusive queue (A, see
//! [`crate::queue`]) and the wakeup primitive (B, see [`crate::Waker`]) the
//! same way `mt/message-queue.c`'s `MT_MessageQueue` does, with one change —
//! the consumer-only half (the event loop) and the producer-shareable half
//! (the atomic queue and waker) are split into two types so the latter can be
//! handed to other threads as a plain `Arc` without smuggling an `Rc` across
//! a thread boundary.

use crate::eventloop::{EventLoop, WAKEUP_TOKEN};
use crate::queue::{Link, Queue};
use crate::{Poll, Waker};

use std::cell::RefCell;
use std::io;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// A node queued for delivery to a single recipient.
///
/// Carries its own dispatch closure (capturing the already-typed payload and
/// delegate, see [`crate::pipe::Pipe::send`] and [`crate::signal::Signal::emit`])
/// plus the weak data used to decide, at drain time, whether the target
/// object is still alive. Mirrors `MTI_MessagePart`; the payload/destructor
/// split of `MTI_MessageHead` collapses into ordinary closure capture and
/// `Drop` here.
pub(crate) struct Node {
    next: AtomicPtr<Node>,
    weak_data: Arc<crate::object::WeakData>,
    invoke: Box<dyn FnOnce() + Send>,
}

unsafe impl Link for Node {
    fn next(&self) -> &AtomicPtr<Node> {
        &self.next
    }
}

impl Node {
    pub(crate) fn new(
        weak_data: Arc<crate::object::WeakData>,
        invoke: Box<dyn FnOnce() + Send>,
    ) -> Box<Node> {
        Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            weak_data,
            invoke,
        })
    }
}

/// The producer-facing, `Send + Sync` half of a thread's message queue.
///
/// Any [`crate::object::WeakData`] carries an `Arc<QueueHandle>` naming the
/// object's affiliated queue; any thread holding that `Arc` can
/// [`QueueHandle::produce`] onto it without synchronizing with the owning
/// thread beyond the queue's own lock-free algorithm.
pub struct QueueHandle {
    queue: Queue<Node>,
    waker: Waker,
    woken: AtomicBool,
    exit_requested: AtomicBool,
}

impl QueueHandle {
    pub(crate) fn from_waker(waker: Waker) -> QueueHandle {
        QueueHandle {
            queue: Queue::new(),
            waker,
            woken: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
        }
    }

    /// Enqueues `node` for this queue's owning thread and, on the 0→1
    /// transition of the `woken` flag, triggers the wakeup primitive.
    ///
    /// Matches `ProxiedSend` in `mt/message-queue.c`: the 0→1 CAS is what
    /// lets concurrent producers coalesce into a single `wake()` call (see
    /// `spec.md` §4.2 and the *Wakeup coalescing* property in §8).
    pub(crate) fn produce(&self, node: Box<Node>) -> io::Result<()> {
        let raw = Box::into_raw(node);
        unsafe { self.queue.produce(raw) };

        if self
            .woken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.waker.wake()?;
        }

        Ok(())
    }

    /// Requests that the owning thread's [`MessageQueue::run`] return after
    /// its current turn, from any thread.
    pub fn request_exit(&self) -> io::Result<()> {
        self.exit_requested.store(true, Ordering::Release);
        self.waker.wake()
    }

    fn take_exit_requested(&self) -> bool {
        self.exit_requested.swap(false, Ordering::AcqRel)
    }
}

// `Node`'s closure and weak-data are both `Send`; the raw pointers the
// intrusive queue stores are otherwise opaque to synchronization, same
// rationale as `crate::queue::Queue`'s own impls.
unsafe impl Send for QueueHandle {}
unsafe impl Sync for QueueHandle {}

/// A per-thread message queue: the consuming half of component D, pairing
/// the lock-free queue with the owned event loop (component C) that the data
/// model (`spec.md` §3) says it holds.
pub struct MessageQueue {
    handle: Arc<QueueHandle>,
    event_loop: Rc<RefCell<EventLoop>>,
}

impl MessageQueue {
    /// Creates a new message queue with its own freshly created `Poll`.
    ///
    /// Use [`MessageQueue::from_parts`] instead when a [`Poll`] was already
    /// created earlier (as [`crate::thread::Thread`] does, so that the
    /// `Arc<QueueHandle>` exists before the worker thread starts).
    pub fn new() -> io::Result<MessageQueue> {
        let poll = Poll::new()?;
        Self::from_parts(poll)
    }

    /// Builds a message queue from a pre-existing `Poll`, registering this
    /// queue's waker at the event loop's reserved [`WAKEUP_TOKEN`].
    pub fn from_parts(poll: Poll) -> io::Result<MessageQueue> {
        let event_loop = EventLoop::from_poll(poll);
        let registry = event_loop.borrow().registry().clone();
        let waker = Waker::new(&registry, WAKEUP_TOKEN)?;
        let handle = Arc::new(QueueHandle::from_waker(waker));
        Ok(MessageQueue { handle, event_loop })
    }

    /// Builds a message queue around an already-constructed `Arc<QueueHandle>`
    /// (used by [`crate::thread::Thread::start`], which must hand out the
    /// handle to the creator thread before the worker exists).
    pub(crate) fn with_handle(
        handle: Arc<QueueHandle>,
        event_loop: Rc<RefCell<EventLoop>>,
    ) -> MessageQueue {
        MessageQueue { handle, event_loop }
    }

    /// A cheaply cloneable, `Send + Sync` reference producers use to deliver
    /// messages to objects affiliated with this queue.
    pub fn handle(&self) -> Arc<QueueHandle> {
        Arc::clone(&self.handle)
    }

    /// Gives access to this thread's event loop, e.g. to register sockets,
    /// timers or idle work.
    pub fn event_loop(&self) -> &Rc<RefCell<EventLoop>> {
        &self.event_loop
    }

    /// Drains every message currently queued, invoking each live recipient's
    /// delegate. Must only be called from the owning thread.
    ///
    /// Resets `woken` to 0 *before* draining, per `spec.md` §4.2: a message
    /// enqueued after this point either gets linked in time to be observed
    /// by this drain, or causes the producer to see `woken == 0` and trigger
    /// a fresh wakeup.
    pub fn drain(&self) {
        self.handle.woken.store(false, Ordering::Release);

        while let Some(raw) = self.handle.queue.consume() {
            let node = unsafe { Box::from_raw(raw) };
            if node.weak_data.is_alive() {
                (node.invoke)();
            }
            // `node`'s drop releases its `Arc<WeakData>` and, via the
            // captured payload/delegate, the envelope allocation.
        }
    }

    /// Runs turns of this queue's event loop, draining queued messages after
    /// every turn, until [`QueueHandle::request_exit`] is called or the
    /// event loop's own `exit()` is called from within a callback.
    pub fn run(&self) -> io::Result<()> {
        loop {
            EventLoop::run_one_turn(&self.event_loop)?;
            self.drain();

            let loop_exit = self.event_loop.borrow_mut().take_exit();
            if loop_exit || self.handle.take_exit_requested() {
                return Ok(());
            }
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<QueueHandle>>> = const { RefCell::new(None) };
    static OWNED: RefCell<Option<MessageQueue>> = const { RefCell::new(None) };
}

static AUTO_QUEUES: OnceLock<Mutex<Vec<Weak<QueueHandle>>>> = OnceLock::new();

fn registry() -> &'static Mutex<Vec<Weak<QueueHandle>>> {
    AUTO_QUEUES.get_or_init(|| Mutex::new(Vec::new()))
}

/// Returns this thread's current affiliated queue, if any has been set by
/// [`set_current_queue`] or auto-created by [`current_or_create_queue`].
pub fn current_queue() -> Option<Arc<QueueHandle>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Sets this thread's current affiliated queue, returning the previous
/// value. Used by [`crate::thread::Thread::begin_init`]/`end_init` to
/// temporarily expose a not-yet-started thread's queue on the creator
/// thread so objects constructed in between affiliate with it.
pub fn set_current_queue(queue: Option<Arc<QueueHandle>>) -> Option<Arc<QueueHandle>> {
    CURRENT.with(|c| c.replace(queue))
}

/// Returns this thread's current queue, auto-creating (and registering for
/// teardown via [`shutdown_registered_queues`]) one the first time a thread
/// needs one without ever having called [`set_current_queue`].
///
/// Mirrors `MTI_CreateCurrentMessageQueue` in `mt/message-queue.c`.
pub fn current_or_create_queue() -> io::Result<Arc<QueueHandle>> {
    if let Some(existing) = current_queue() {
        return Ok(existing);
    }

    let mq = MessageQueue::new()?;
    let handle = mq.handle();

    registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(Arc::downgrade(&handle));

    CURRENT.with(|c| *c.borrow_mut() = Some(Arc::clone(&handle)));
    OWNED.with(|o| *o.borrow_mut() = Some(mq));

    Ok(handle)
}

/// Runs `f` with a reference to this thread's owned [`MessageQueue`], if one
/// has been auto-created or installed by [`install_message_queue`].
pub fn with_current_message_queue<R>(f: impl FnOnce(Option<&MessageQueue>) -> R) -> R {
    OWNED.with(|o| f(o.borrow().as_ref()))
}

/// Installs `mq` as this thread's owned message queue and its handle as the
/// current affiliated queue; used by [`crate::thread::Thread::start`]'s
/// worker entry point.
pub(crate) fn install_message_queue(mq: MessageQueue) {
    let handle = mq.handle();
    CURRENT.with(|c| *c.borrow_mut() = Some(handle));
    OWNED.with(|o| *o.borrow_mut() = Some(mq));
}

/// Drops the bookkeeping list of auto-created queues (§9 "Global
/// current-queue state"). Embedders that do not rely on process exit (and
/// tests, to avoid leaking registrations across cases) can call this
/// explicitly; it does not affect any thread's own `CURRENT`/`OWNED` state.
pub fn shutdown_registered_queues() {
    registry().lock().unwrap_or_else(|e| e.into_inner()).clear();
}
