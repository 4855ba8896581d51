//! A `mio`-backed [`Reactor`] adapter: a single-threaded, non-async,
//! readiness-driven poll loop plus a one-shot timer heap.

use std::collections::BinaryHeap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use super::{Event, Reactor, Registration, Timer};

pub struct MioRegistration {
    token: Token,
    fd: RawFd,
    read: bool,
    write: bool,
    registry: mio::Registry,
}

impl MioRegistration {
    fn interest(&self) -> Option<Interest> {
        match (self.read, self.write) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    fn reregister(&self) {
        let mut source = SourceFd(&self.fd);
        match self.interest() {
            Some(interest) => {
                let _ = self.registry.reregister(&mut source, self.token, interest);
            }
            None => {
                let _ = self.registry.deregister(&mut source);
            }
        }
    }
}

impl Registration for MioRegistration {
    fn enable_read(&mut self) {
        self.read = true;
        self.reregister();
    }

    fn disable_read(&mut self) {
        self.read = false;
        self.reregister();
    }

    fn enable_write(&mut self) {
        self.write = true;
        self.reregister();
    }

    fn disable_write(&mut self) {
        self.write = false;
        self.reregister();
    }
}

/// A one-shot timer, tracked by this reactor's internal deadline heap.
/// Dropping or cancelling it just prevents delivery; the slot is pruned
/// lazily the next time it would have fired.
pub struct MioTimer {
    id: u64,
    cancelled: std::rc::Rc<std::cell::RefCell<std::collections::HashSet<u64>>>,
}

impl Timer for MioTimer {
    fn cancel(&mut self) {
        self.cancelled.borrow_mut().insert(self.id);
    }
}

struct Deadline {
    at: Instant,
    id: u64,
}

impl Eq for Deadline {}
impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; we want the soonest deadline first.
        other.at.cmp(&self.at)
    }
}
impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct MioReactor {
    poll: Poll,
    next_token: usize,
    next_timer_id: u64,
    timers: BinaryHeap<Deadline>,
    cancelled: std::rc::Rc<std::cell::RefCell<std::collections::HashSet<u64>>>,
}

impl MioReactor {
    pub fn new() -> io::Result<Self> {
        Ok(MioReactor {
            poll: Poll::new()?,
            next_token: 0,
            next_timer_id: 0,
            timers: BinaryHeap::new(),
            cancelled: Default::default(),
        })
    }

    /// Block until a readiness event fires, a timer expires, or `timeout`
    /// elapses (`None` blocks indefinitely, matching the first
    /// `reconnect_timer` scheduled for "now" being a zero-delay case).
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Event<Token, u64>>> {
        let mut out = Vec::new();
        let now = Instant::now();
        let next_deadline = self.timers.peek().map(|d| d.at);
        let wait = match (timeout, next_deadline) {
            (Some(t), Some(d)) => Some(t.min(d.saturating_duration_since(now))),
            (Some(t), None) => Some(t),
            (None, Some(d)) => Some(d.saturating_duration_since(now)),
            (None, None) => None,
        };

        let mut events = Events::with_capacity(128);
        self.poll.poll(&mut events, wait)?;
        for ev in events.iter() {
            let token = ev.token();
            if ev.is_readable() {
                out.push(Event::Readable(token));
            }
            if ev.is_writable() {
                out.push(Event::Writable(token));
            }
        }

        let now = Instant::now();
        while let Some(d) = self.timers.peek() {
            if d.at > now {
                break;
            }
            let fired = self.timers.pop().unwrap();
            if !self.cancelled.borrow_mut().remove(&fired.id) {
                out.push(Event::TimerFired(fired.id));
            }
        }
        Ok(out)
    }
}

impl Reactor for MioReactor {
    type Registration = MioRegistration;
    type Timer = MioTimer;

    fn register(&mut self, fd: RawFd) -> MioRegistration {
        let token = Token(self.next_token);
        self.next_token += 1;
        let registry = self.poll.registry().try_clone().expect("poll registry is cloneable");
        // mio requires a non-empty interest set at registration time; we
        // register READABLE as a placeholder and let the caller's
        // enable_read/enable_write calls reregister with whatever
        // interest it actually wants.
        let mut source = SourceFd(&fd);
        registry
            .register(&mut source, token, Interest::READABLE)
            .expect("registering a freshly-opened socket should not fail");
        MioRegistration { token, fd, read: true, write: false, registry }
    }

    fn unregister(&mut self, registration: MioRegistration) {
        let mut source = SourceFd(&registration.fd);
        let _ = self.poll.registry().deregister(&mut source);
    }

    fn timer_arm(&mut self, delay: Duration) -> MioTimer {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(Deadline { at: Instant::now() + delay, id });
        MioTimer { id, cancelled: self.cancelled.clone() }
    }
}
