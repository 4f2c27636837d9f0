//! A single-threaded event loop multiplexing socket readiness, timers and
//! idle work into a strict, priority-ordered sequence of turns.
//!
//! An [`EventLoop`] is never shared between threads: it owns a [`crate::Poll`]
//! and a handful of registration tables indexed by slot id. Cross-thread
//! wakeups arrive through the same [`crate::Waker`]/[`crate::sys`] plumbing
//! every other [`crate::Poll`] user relies on; [`crate::message`] is the only
//! caller that needs that path, and it reserves the loop's waker token for
//! itself.
//!
//! Each call to [`EventLoop::run_one_turn`] performs exactly one of the
//! following, in order, and returns:
//!
//! 1. dispatch the next undispatched readiness bit of a socket event that a
//!    previous poll already returned (read, then close, then write, then
//!    accept);
//! 2. if the earliest timer has already expired, reinsert it at its next
//!    fire time and run its callback;
//! 3. if any idle registration exists, poll with a zero timeout for fresh OS
//!    events (dispatching one if found) and otherwise run the next idle
//!    callback in round-robin order;
//! 4. block in poll until the earliest timer is due (or forever, with none
//!    registered), dispatching a socket bit if the block produced one;
//! 5. otherwise the block in step 4 was satisfied by the timer's own
//!    deadline: reinsert and fire it.
//!
//! This mirrors `mt/event-queue.c`'s `StepEventQueue`, with the `setjmp`
//! dispatch table replaced by ordinary `Option<Callback>` fields.

use crate::{event, Events, Interest, Poll, Registry, Token};

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A callback run with no arguments; state is captured by the closure.
pub type Callback = Box<dyn FnMut() + 'static>;

/// The set of readiness/work bits a registration can be interested in.
///
/// Mirrors the `MT_EVENT_*` flags of the original event queue. Socket
/// registrations use `READ`/`WRITE`/`CLOSE`/`ACCEPT`; tick and idle
/// registrations use `TICK`/`IDLE` purely as an enable/disable switch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EventFlags(u8);

impl EventFlags {
    pub const NONE: EventFlags = EventFlags(0);
    pub const READ: EventFlags = EventFlags(1 << 0);
    pub const WRITE: EventFlags = EventFlags(1 << 1);
    pub const CLOSE: EventFlags = EventFlags(1 << 2);
    pub const ACCEPT: EventFlags = EventFlags(1 << 3);
    pub const TICK: EventFlags = EventFlags(1 << 4);
    pub const IDLE: EventFlags = EventFlags(1 << 5);

    pub fn contains(self, other: EventFlags) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: EventFlags) {
        self.0 |= other.0;
    }

    fn remove(&mut self, other: EventFlags) {
        self.0 &= !other.0;
    }

    fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EventFlags {
    type Output = EventFlags;
    fn bitor(self, rhs: EventFlags) -> EventFlags {
        EventFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for EventFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventFlags({:#04b})", self.0)
    }
}

struct SocketCallbacks {
    read: Option<Callback>,
    write: Option<Callback>,
    close: Option<Callback>,
    accept: Option<Callback>,
}

struct SocketSlot {
    token: Token,
    enabled: EventFlags,
    /// Readiness bits this slot has been told about but not yet dispatched.
    /// Cleared one bit at a time, in read/close/write/accept order, as
    /// [`EventLoop::dispatch_cached`] walks `cached_tokens`.
    pending: EventFlags,
    callbacks: SocketCallbacks,
}

struct TimerSlot {
    period: Duration,
    next_fire: Instant,
    enabled: bool,
    callback: Callback,
}

struct IdleSlot {
    enabled: bool,
    callback: Callback,
}

/// What a [`Registration`] refers to, so its methods know which table to
/// operate on.
enum RegKind {
    Socket,
    Timer,
    Idle,
}

/// A handle to a live registration in an [`EventLoop`].
///
/// Returned by `EventLoop::new_socket_*`/`new_timer`/`new_idle`. Dropping a
/// `Registration` does not free it — call [`Registration::free`]
/// explicitly, matching the original's explicit `MT_FreeEvent`, since the
/// loop must run the socket's deregistration (or the timer/idle slot removal
/// and cursor adjustment) synchronously rather than from a `Drop` impl that
/// cannot report I/O errors.
pub struct Registration {
    loop_handle: Rc<RefCell<EventLoop>>,
    kind: RegKind,
    id: usize,
}

impl Registration {
    /// Enables the flags named in `flags`, leaving others untouched.
    pub fn enable(&self, flags: EventFlags) {
        self.loop_handle.borrow_mut().enable(self.id, &self.kind, flags);
    }

    /// Disables the flags named in `flags`, leaving others untouched.
    pub fn disable(&self, flags: EventFlags) {
        self.loop_handle.borrow_mut().disable(self.id, &self.kind, flags);
    }

    /// Resets a timer's next fire time to `now + period`, leaving its
    /// enabled state untouched. Only valid for timer registrations.
    pub fn reset(&self) {
        self.loop_handle.borrow_mut().reset_timer(self.id);
    }

    /// Removes the registration permanently. For sockets this deregisters
    /// `source` from the underlying [`Registry`]; callers must pass the same
    /// source (or an equivalent handle to the same fd) that was registered.
    pub fn free(self, source: Option<&mut dyn event::Source>) -> io::Result<()> {
        self.loop_handle.borrow_mut().free(self.id, &self.kind, source)
    }
}

/// Per-thread event loop. See the module documentation for the turn order.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    /// Readiness events from the last non-empty poll, not yet fully
    /// dispatched. Indices into `sockets`.
    cached_tokens: Vec<usize>,
    sockets: Vec<Option<SocketSlot>>,
    free_sockets: Vec<usize>,
    next_token: usize,
    /// Kept sorted ascending by `next_fire`; index 0 is always the next
    /// timer due.
    timer_order: Vec<usize>,
    timers: Vec<Option<TimerSlot>>,
    free_timers: Vec<usize>,
    idle_order: Vec<usize>,
    idles: Vec<Option<IdleSlot>>,
    free_idles: Vec<usize>,
    next_idle: usize,
    exit: bool,
}

/// Reserved for the embedded message-queue wakeup registration; `Token`
/// documents `usize::MAX` as reserved, so loop-owned tokens start at 0 and
/// this sentinel can never collide with one.
pub(crate) const WAKEUP_TOKEN: Token = Token(usize::MAX - 1);

impl EventLoop {
    pub fn new() -> io::Result<Rc<RefCell<EventLoop>>> {
        Ok(Self::from_poll(Poll::new()?))
    }

    /// Builds an event loop around an already-created `Poll`.
    ///
    /// Used by [`crate::message::MessageQueue::from_parts`] and
    /// [`crate::thread::Thread`], which both need the `Poll` (and the
    /// `Registry` it exposes) to exist before the event loop itself is
    /// built — a `Thread`'s queue handle is created on the creator thread,
    /// while its `EventLoop` is only assembled once the worker starts.
    pub fn from_poll(poll: Poll) -> Rc<RefCell<EventLoop>> {
        Rc::new(RefCell::new(EventLoop {
            poll,
            events: Events::with_capacity(128),
            cached_tokens: Vec::new(),
            sockets: Vec::new(),
            free_sockets: Vec::new(),
            next_token: 0,
            timer_order: Vec::new(),
            timers: Vec::new(),
            free_timers: Vec::new(),
            idle_order: Vec::new(),
            idles: Vec::new(),
            free_idles: Vec::new(),
            next_idle: 0,
            exit: false,
        }))
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    fn alloc_token(&mut self) -> Token {
        let id = self.next_token;
        self.next_token += 1;
        Token(id)
    }

    fn new_socket(
        loop_rc: &Rc<RefCell<EventLoop>>,
        source: &mut dyn event::Source,
        interest: Interest,
        callbacks: SocketCallbacks,
        enabled: EventFlags,
    ) -> io::Result<Registration> {
        let mut this = loop_rc.borrow_mut();
        let token = this.alloc_token();
        this.registry().register(source, token, interest)?;

        let slot = SocketSlot {
            token,
            enabled,
            pending: EventFlags::NONE,
            callbacks,
        };

        let id = if let Some(id) = this.free_sockets.pop() {
            this.sockets[id] = Some(slot);
            id
        } else {
            this.sockets.push(Some(slot));
            this.sockets.len() - 1
        };

        drop(this);
        Ok(Registration {
            loop_handle: Rc::clone(loop_rc),
            kind: RegKind::Socket,
            id,
        })
    }

    /// Registers a client-side socket (read/write/close callbacks).
    pub fn new_socket_client(
        loop_rc: &Rc<RefCell<EventLoop>>,
        source: &mut dyn event::Source,
        on_read: Option<Callback>,
        on_write: Option<Callback>,
        on_close: Option<Callback>,
    ) -> io::Result<Registration> {
        let mut enabled = EventFlags::NONE;
        if on_read.is_some() {
            enabled.insert(EventFlags::READ);
        }
        if on_write.is_some() {
            enabled.insert(EventFlags::WRITE);
        }
        if on_close.is_some() {
            enabled.insert(EventFlags::CLOSE);
        }

        Self::new_socket(
            loop_rc,
            source,
            Interest::READABLE | Interest::WRITABLE,
            SocketCallbacks {
                read: on_read,
                write: on_write,
                close: on_close,
                accept: None,
            },
            enabled,
        )
    }

    /// Registers a listening socket (accept callback only).
    pub fn new_socket_server(
        loop_rc: &Rc<RefCell<EventLoop>>,
        source: &mut dyn event::Source,
        on_accept: Callback,
    ) -> io::Result<Registration> {
        Self::new_socket(
            loop_rc,
            source,
            Interest::READABLE,
            SocketCallbacks {
                read: None,
                write: None,
                close: None,
                accept: Some(on_accept),
            },
            EventFlags::ACCEPT,
        )
    }

    /// Registers a periodic timer, enabled immediately, firing every
    /// `period` starting at `now + period`.
    pub fn new_timer(
        loop_rc: &Rc<RefCell<EventLoop>>,
        period: Duration,
        callback: Callback,
    ) -> Registration {
        let mut this = loop_rc.borrow_mut();
        let next_fire = Instant::now() + period;
        let slot = TimerSlot {
            period,
            next_fire,
            enabled: true,
            callback,
        };

        let id = if let Some(id) = this.free_timers.pop() {
            this.timers[id] = Some(slot);
            id
        } else {
            this.timers.push(Some(slot));
            this.timers.len() - 1
        };

        let pos = this.timer_insert_pos(next_fire);
        this.timer_order.insert(pos, id);

        drop(this);
        Registration {
            loop_handle: Rc::clone(loop_rc),
            kind: RegKind::Timer,
            id,
        }
    }

    /// Registers idle work, run once per loop iteration in round-robin order
    /// whenever no socket or timer work is pending.
    pub fn new_idle(loop_rc: &Rc<RefCell<EventLoop>>, callback: Callback) -> Registration {
        let mut this = loop_rc.borrow_mut();
        let slot = IdleSlot {
            enabled: true,
            callback,
        };

        let id = if let Some(id) = this.free_idles.pop() {
            this.idles[id] = Some(slot);
            id
        } else {
            this.idles.push(Some(slot));
            this.idles.len() - 1
        };

        this.idle_order.push(id);

        drop(this);
        Registration {
            loop_handle: Rc::clone(loop_rc),
            kind: RegKind::Idle,
            id,
        }
    }

    /// First index in `timer_order` whose slot's `next_fire` is strictly
    /// greater than `next_fire`.
    ///
    /// The original C (`FindFirstGreaterOrEqual` in `mt/event-queue.c`)
    /// is a binary search with the stated intent of being an upper bound,
    /// but its comparison (`key <= elem`) is in fact the standard
    /// *lower*-bound predicate: inserted at that position, a newly enabled
    /// timer with a next-fire tied with existing entries would land
    /// *before* them, reversing insertion order. `spec.md`'s timer-ordering
    /// property requires same-tick timers to fire in FIFO insertion order,
    /// so this uses a true upper bound instead: ties land after every
    /// existing entry with the same `next_fire`. See `DESIGN.md`.
    fn timer_insert_pos(&self, next_fire: Instant) -> usize {
        self.timer_order
            .partition_point(|&id| self.timers[id].as_ref().unwrap().next_fire <= next_fire)
    }

    fn enable(&mut self, id: usize, kind: &RegKind, flags: EventFlags) {
        match kind {
            RegKind::Socket => {
                if let Some(slot) = self.sockets[id].as_mut() {
                    slot.enabled.insert(flags);
                }
            }
            RegKind::Timer => {
                if flags.contains(EventFlags::TICK) {
                    if let Some(slot) = self.timers[id].as_mut() {
                        slot.enabled = true;
                    }
                }
            }
            RegKind::Idle => {
                if flags.contains(EventFlags::IDLE) {
                    if let Some(slot) = self.idles[id].as_mut() {
                        slot.enabled = true;
                    }
                }
            }
        }
    }

    fn disable(&mut self, id: usize, kind: &RegKind, flags: EventFlags) {
        match kind {
            RegKind::Socket => {
                if let Some(slot) = self.sockets[id].as_mut() {
                    slot.enabled.remove(flags);
                    slot.pending.remove(flags);
                }
            }
            RegKind::Timer => {
                if flags.contains(EventFlags::TICK) {
                    if let Some(slot) = self.timers[id].as_mut() {
                        slot.enabled = false;
                    }
                }
            }
            RegKind::Idle => {
                if flags.contains(EventFlags::IDLE) {
                    if let Some(slot) = self.idles[id].as_mut() {
                        slot.enabled = false;
                    }
                }
            }
        }
    }

    fn reset_timer(&mut self, id: usize) {
        if let Some(pos) = self.timer_order.iter().position(|&x| x == id) {
            self.timer_order.remove(pos);
        }
        let next_fire = {
            let slot = self.timers[id].as_mut().unwrap();
            slot.next_fire = Instant::now() + slot.period;
            slot.next_fire
        };
        let pos = self.timer_insert_pos(next_fire);
        self.timer_order.insert(pos, id);
    }

    fn free(
        &mut self,
        id: usize,
        kind: &RegKind,
        source: Option<&mut dyn event::Source>,
    ) -> io::Result<()> {
        match kind {
            RegKind::Socket => {
                if let Some(source) = source {
                    self.registry().deregister(source)?;
                }
                self.sockets[id] = None;
                self.free_sockets.push(id);
                self.cached_tokens.retain(|&x| x != id);
            }
            RegKind::Timer => {
                if let Some(pos) = self.timer_order.iter().position(|&x| x == id) {
                    self.timer_order.remove(pos);
                }
                self.timers[id] = None;
                self.free_timers.push(id);
            }
            RegKind::Idle => {
                if let Some(pos) = self.idle_order.iter().position(|&x| x == id) {
                    self.idle_order.remove(pos);
                    // A freed slot ahead of the cursor shifts every later
                    // index down by one; keep `next_idle` pointing at the
                    // same logical successor rather than skipping or
                    // repeating an entry.
                    if pos < self.next_idle && self.next_idle > 0 {
                        self.next_idle -= 1;
                    }
                }
                self.idles[id] = None;
                self.free_idles.push(id);
            }
        }
        Ok(())
    }

    /// Requests that [`EventLoop::run`] return after the current turn.
    pub fn exit(&mut self) {
        self.exit = true;
    }

    /// Reads and clears the exit flag. Used by
    /// [`crate::message::MessageQueue::run`], which drives turns itself
    /// rather than through [`EventLoop::run`] so it can interleave message
    /// draining between them.
    pub(crate) fn take_exit(&mut self) -> bool {
        std::mem::take(&mut self.exit)
    }

    /// Runs turns until [`EventLoop::exit`] is called.
    pub fn run(loop_rc: &Rc<RefCell<EventLoop>>) -> io::Result<()> {
        loop {
            if loop_rc.borrow().exit {
                loop_rc.borrow_mut().exit = false;
                return Ok(());
            }
            Self::run_one_turn(loop_rc)?;
        }
    }

    /// Runs exactly one turn of the loop, per the module-level ordering.
    ///
    /// Every step that invokes a callback does so with no outstanding
    /// borrow of `loop_rc` held: a callback is free to call
    /// `Registration::enable`/`disable`/`reset`/`free` on itself or on any
    /// other registration sharing this loop (per `spec.md` §4.1/§5, e.g.
    /// "freeing a socket event during dispatch of that socket is legal" and
    /// the watchdog pattern of calling `reset()` from inside a timer's own
    /// callback), and those methods borrow `loop_rc` themselves.
    pub fn run_one_turn(loop_rc: &Rc<RefCell<EventLoop>>) -> io::Result<()> {
        // 1. Already-known, not yet fully dispatched socket events.
        if Self::dispatch_cached(loop_rc) {
            return Ok(());
        }

        // 2. Expired timer.
        if let Some(id) = loop_rc.borrow().timer_order.first().copied() {
            let due = loop_rc.borrow().timers[id].as_ref().unwrap().next_fire;
            if Instant::now() >= due {
                Self::fire_timer(loop_rc, id);
                return Ok(());
            }
        }

        // 3-4. Idle work, preceded by a zero-timeout poll so fresh socket
        // readiness always pre-empts idle work.
        if !loop_rc.borrow().idle_order.is_empty() {
            if loop_rc.borrow_mut().poll_and_cache(Some(Duration::ZERO))? {
                Self::dispatch_cached(loop_rc);
                return Ok(());
            }

            if Self::run_next_idle(loop_rc) {
                return Ok(());
            }
        }

        // 5. Blocking poll, bounded by the next timer if one exists.
        let next_timer = loop_rc.borrow().timer_order.first().copied();
        let timeout = next_timer.map(|id| {
            let due = loop_rc.borrow().timers[id].as_ref().unwrap().next_fire;
            due.saturating_duration_since(Instant::now())
        });

        if loop_rc.borrow_mut().poll_and_cache(timeout)? {
            Self::dispatch_cached(loop_rc);
            return Ok(());
        }

        // 6. The block above was satisfied by the timer's own deadline.
        if let Some(id) = loop_rc.borrow().timer_order.first().copied() {
            Self::fire_timer(loop_rc, id);
        }

        Ok(())
    }

    /// Polls with the given timeout (`None` blocks forever), caching any
    /// events returned. Returns whether any events were found.
    fn poll_and_cache(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let mut found = false;
        for event in self.events.iter() {
            let token = event.token();
            if token == WAKEUP_TOKEN {
                // The message queue's own waker; message.rs drains its
                // queue on the next turn regardless, nothing to cache here.
                found = true;
                continue;
            }

            let id = token.0;
            if let Some(Some(slot)) = self.sockets.get_mut(id) {
                let mut bits = EventFlags::NONE;
                if event.is_readable() {
                    bits.insert(EventFlags::READ);
                    bits.insert(EventFlags::ACCEPT);
                }
                if event.is_writable() {
                    bits.insert(EventFlags::WRITE);
                }
                if event.is_hup() || event.is_error() {
                    bits.insert(EventFlags::CLOSE);
                }

                let newly_pending = bits.0 & slot.enabled.0 & !slot.pending.0;
                if newly_pending != 0 {
                    slot.pending.insert(EventFlags(newly_pending));
                    if !self.cached_tokens.contains(&id) {
                        self.cached_tokens.push(id);
                    }
                }
                found = true;
            }
        }

        Ok(found)
    }

    /// Dispatches exactly one pending bit of the front of `cached_tokens`,
    /// in read/close/write/accept priority order, matching `HandleEvent` in
    /// `mt/event-queue.c`. Returns whether anything was dispatched.
    ///
    /// The chosen callback is moved out of its slot with [`Option::take`]
    /// before `loop_rc`'s borrow is dropped, invoked with no borrow held,
    /// then put back afterward if the slot still exists — a callback that
    /// frees its own registration (or calls `enable`/`disable`/`reset` on
    /// any registration sharing this loop) must not find `loop_rc` already
    /// borrowed.
    fn dispatch_cached(loop_rc: &Rc<RefCell<EventLoop>>) -> bool {
        type Take = fn(&mut SocketCallbacks) -> Option<Callback>;
        type PutBack = fn(&mut SocketCallbacks, Callback);
        const ORDER: [(EventFlags, Take, PutBack); 4] = [
            (EventFlags::READ, |c| c.read.take(), |c, cb| c.read = Some(cb)),
            (EventFlags::CLOSE, |c| c.close.take(), |c, cb| c.close = Some(cb)),
            (EventFlags::WRITE, |c| c.write.take(), |c, cb| c.write = Some(cb)),
            (EventFlags::ACCEPT, |c| c.accept.take(), |c, cb| c.accept = Some(cb)),
        ];

        loop {
            let picked = {
                let mut this = loop_rc.borrow_mut();

                let Some(id) = this.cached_tokens.first().copied() else {
                    return false;
                };

                let Some(slot) = this.sockets.get_mut(id).and_then(|s| s.as_mut()) else {
                    this.cached_tokens.remove(0);
                    continue;
                };

                if slot.pending.is_none() {
                    this.cached_tokens.remove(0);
                    continue;
                }

                let mut picked = None;
                for (bit, take, put_back) in ORDER {
                    if slot.pending.contains(bit) {
                        slot.pending.remove(bit);
                        if let Some(cb) = take(&mut slot.callbacks) {
                            picked = Some((id, put_back, cb));
                            break;
                        }
                    }
                }

                if picked.is_none() {
                    // Every pending bit lacked a callback; drop them all and
                    // move on to the next cached token.
                    slot.pending = EventFlags::NONE;
                    this.cached_tokens.remove(0);
                }

                picked
            };

            let Some((id, put_back, mut cb)) = picked else {
                continue;
            };

            cb();

            let mut this = loop_rc.borrow_mut();
            if let Some(slot) = this.sockets.get_mut(id).and_then(|s| s.as_mut()) {
                put_back(&mut slot.callbacks, cb);
                if slot.pending.is_none() {
                    this.cached_tokens.retain(|&x| x != id);
                }
            }
            return true;
        }
    }

    /// Fires the timer at `id`: re-inserts it for its next period, then
    /// invokes its callback with no borrow of `loop_rc` held, so a
    /// watchdog-style callback that calls `Registration::reset` on itself
    /// (the pattern `spec.md` §4.1's Reset semantics describes) does not
    /// re-enter an already-borrowed `loop_rc`.
    fn fire_timer(loop_rc: &Rc<RefCell<EventLoop>>, id: usize) {
        let taken = {
            let mut this = loop_rc.borrow_mut();
            this.timer_order.remove(0);

            let next_fire = {
                let slot = this.timers[id].as_mut().unwrap();
                slot.next_fire += slot.period;
                slot.next_fire
            };
            let pos = this.timer_insert_pos(next_fire);
            this.timer_order.insert(pos, id);

            let slot = this.timers[id].as_mut().unwrap();
            slot.enabled
                .then(|| std::mem::replace(&mut slot.callback, Box::new(|| {})))
        };

        let Some(mut cb) = taken else {
            return;
        };
        cb();

        let mut this = loop_rc.borrow_mut();
        if let Some(slot) = this.timers[id].as_mut() {
            slot.callback = cb;
        }
    }

    fn run_next_idle(loop_rc: &Rc<RefCell<EventLoop>>) -> bool {
        let taken = {
            let mut this = loop_rc.borrow_mut();
            let len = this.idle_order.len();
            if len == 0 {
                return false;
            }

            let mut picked = None;
            for _ in 0..len {
                if this.next_idle >= this.idle_order.len() {
                    this.next_idle = 0;
                }
                let id = this.idle_order[this.next_idle];
                this.next_idle += 1;

                let enabled = this.idles[id].as_ref().map(|s| s.enabled).unwrap_or(false);
                if enabled {
                    let slot = this.idles[id].as_mut().unwrap();
                    let cb = std::mem::replace(&mut slot.callback, Box::new(|| {}));
                    picked = Some((id, cb));
                    break;
                }
            }
            picked
        };

        let Some((id, mut cb)) = taken else {
            return false;
        };
        cb();

        let mut this = loop_rc.borrow_mut();
        if let Some(slot) = this.idles[id].as_mut() {
            slot.callback = cb;
        }
        true
    }
}
