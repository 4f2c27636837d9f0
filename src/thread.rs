//! An owning container pairing a message queue (and its event loop) with a
//! worker OS thread (component H).
//!
//! Grounded in `mt/thread.c`. `begin_init`/`end_init` expose the new
//! thread's queue handle as the *creator* thread's current queue for the
//! duration of a setup block, so that objects constructed there — meant to
//! live on the new thread — affiliate correctly before the thread exists.
//! `start` then hands the already-created `Poll` (and with it, the
//! `Registry` the queue handle's waker is bound to) into the spawned
//! thread, where the event loop itself is assembled.

use crate::eventloop::EventLoop;
use crate::message::{self, MessageQueue, QueueHandle};
use crate::signal::Signal;
use crate::{Poll, Waker};

use std::cell::RefCell;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

thread_local! {
    static CURRENT_THREAD_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// The name of the calling thread, if it was started via [`Thread::start`]
/// or had one set directly by an embedder.
///
/// Mirrors `MT_GetCurrentThreadName`.
pub fn current_thread_name() -> Option<String> {
    CURRENT_THREAD_NAME.with(|n| n.borrow().clone())
}

fn set_current_thread_name(name: &str) {
    CURRENT_THREAD_NAME.with(|n| *n.borrow_mut() = Some(name.to_string()));
}

/// A handle to a named worker thread that owns exactly one message queue
/// and event loop for its lifetime.
///
/// The `Arc<QueueHandle>` — and therefore the ability to affiliate objects
/// and bind pipes/signals to this thread — exists from [`Thread::new`]
/// onward, before [`Thread::start`] ever spawns the OS thread, matching
/// `MT_NewThread`'s eager `MT_NewMessageQueue`.
pub struct Thread {
    name: String,
    poll: Option<Poll>,
    queue_handle: Arc<QueueHandle>,
    handle: Option<JoinHandle<()>>,
    started: bool,
    joined: AtomicBool,
    /// Fires with the worker's exit code once its entry function returns.
    pub on_exit: Arc<Signal<i32>>,
}

impl Thread {
    /// Creates the thread's queue (and the `Poll` it will hand to the
    /// worker) without spawning anything yet.
    pub fn new(name: impl Into<String>) -> io::Result<Thread> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), crate::eventloop::WAKEUP_TOKEN)?;
        let queue_handle = Arc::new(message::QueueHandle::from_waker(waker));

        Ok(Thread {
            name: name.into(),
            poll: Some(poll),
            queue_handle,
            handle: None,
            started: false,
            joined: AtomicBool::new(false),
            on_exit: Arc::new(Signal::new()),
        })
    }

    /// This thread's name, as passed to [`Thread::new`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue handle objects affiliate with to live on this thread.
    /// Usable immediately, even before [`Thread::start`].
    pub fn queue_handle(&self) -> Arc<QueueHandle> {
        Arc::clone(&self.queue_handle)
    }

    /// Temporarily installs this thread's queue as the *calling* thread's
    /// current queue, returning whatever was current before. Pair with
    /// [`Thread::end_init`] (passing back the returned value) around
    /// construction of objects meant to live on this thread.
    pub fn begin_init(&self) -> Option<Arc<QueueHandle>> {
        message::set_current_queue(Some(self.queue_handle()))
    }

    /// Restores the calling thread's current queue to `previous`, as
    /// returned by [`Thread::begin_init`].
    pub fn end_init(&self, previous: Option<Arc<QueueHandle>>) {
        message::set_current_queue(previous);
    }

    /// Spawns the worker thread, builds its [`MessageQueue`] there, and
    /// runs `entry` with access to it. Once `entry` returns, emits
    /// `on_exit` with `entry`'s return value. Panics if called more than
    /// once.
    pub fn start<F>(&mut self, entry: F) -> io::Result<()>
    where
        F: FnOnce(&MessageQueue) -> i32 + Send + 'static,
    {
        assert!(!self.started, "Thread::start called twice");
        let poll = self
            .poll
            .take()
            .expect("Thread::start called after the Poll was already consumed");

        let queue_handle = Arc::clone(&self.queue_handle);
        let on_exit = Arc::clone(&self.on_exit);
        let name = self.name.clone();

        let builder = std::thread::Builder::new().name(name.clone());
        self.handle = Some(builder.spawn(move || {
            set_current_thread_name(&name);
            message::set_current_queue(Some(Arc::clone(&queue_handle)));

            let event_loop = EventLoop::from_poll(poll);
            let mq = MessageQueue::with_handle(Arc::clone(&queue_handle), event_loop);
            message::install_message_queue(mq);

            let exit_code =
                message::with_current_message_queue(|mq| entry(mq.expect("just installed")));

            on_exit.emit(exit_code);
        })?);

        self.started = true;
        Ok(())
    }

    /// Requests that the worker's [`MessageQueue::run`] return after its
    /// current turn. Safe to call from any thread, including before
    /// [`Thread::start`] (the request is simply observed once the worker's
    /// loop starts running).
    pub fn request_exit(&self) -> io::Result<()> {
        self.queue_handle.request_exit()
    }

    /// Blocks until the worker thread has exited. A no-op if the thread was
    /// never started or has already been joined.
    pub fn join(&mut self) -> std::thread::Result<()> {
        if self.joined.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.started && !self.joined.load(Ordering::Acquire) {
            let _ = self.request_exit();
            let _ = self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;
    use crate::object::Affiliation;
    use crate::signal::DeliveryMode;
    use std::sync::mpsc;

    #[test]
    fn queue_handle_is_usable_before_start() {
        let t = Thread::new("pre-start").unwrap();
        // Doesn't panic, and the same underlying handle comes back twice.
        assert!(Arc::ptr_eq(&t.queue_handle(), &t.queue_handle()));
    }

    #[test]
    fn begin_init_end_init_round_trip_current_queue() {
        let outer = Thread::new("outer").unwrap();
        let before = message::current_queue();

        let prev = outer.begin_init();
        let during = message::current_queue();
        assert!(Arc::ptr_eq(&during.unwrap(), &outer.queue_handle()));

        outer.end_init(prev);
        let after = message::current_queue();
        assert!(match (&before, &after) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        });
    }

    #[test]
    fn start_runs_entry_on_worker_and_fires_on_exit() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_entry = Arc::clone(&ran);
        let (tx, rx) = mpsc::channel();

        let listener = Affiliation::current().unwrap();
        let mut t = Thread::new("worker").unwrap();
        t.on_exit.connect(listener.weak_ref(), DeliveryMode::Direct, move |code| {
            tx.send(*code).unwrap();
        });
        t.start(move |mq| {
            ran_in_entry.store(true, Ordering::SeqCst);
            mq.handle().request_exit().unwrap();
            42
        })
        .unwrap();

        let code = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(code, 42, "on_exit must carry entry's actual return value");
        t.join().unwrap();
    }

    #[test]
    fn join_is_idempotent_and_a_no_op_before_start() {
        let mut t = Thread::new("never-started").unwrap();
        t.join().unwrap();
        t.join().unwrap();
    }

    #[test]
    fn current_thread_name_is_set_on_worker_thread() {
        let (tx, rx) = mpsc::channel();
        let mut t = Thread::new("named-worker").unwrap();
        t.start(move |mq| {
            tx.send(current_thread_name()).unwrap();
            mq.handle().request_exit().unwrap();
            0
        })
        .unwrap();

        let name = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("named-worker"));
        t.join().unwrap();
    }

    #[test]
    fn request_exit_before_start_is_observed_once_run() {
        let (tx, rx) = mpsc::channel();
        let mut t = Thread::new("exit-before-start").unwrap();
        t.request_exit().unwrap();
        t.start(move |mq| {
            mq.run().unwrap();
            tx.send(()).unwrap();
            0
        })
        .unwrap();

        rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        t.join().unwrap();
    }
}
