//! The abstract event-loop interface the client consumes.
//!
//! The connection manager only needs readiness registration with
//! per-direction enable/disable, and a one-shot timer; it never talks to
//! a specific event loop directly. [`mio_adapter`] is the one concrete
//! implementation shipped in this crate.

use std::time::Duration;

/// A registration for one socket's read/write readiness.
///
/// Implementations own whatever bookkeeping (fd table slot, mio token...)
/// is needed to turn `enable_read`/`enable_write` into real readiness
/// notifications delivered back through [`Reactor::poll`].
pub trait Registration {
    fn enable_read(&mut self);
    fn disable_read(&mut self);
    fn enable_write(&mut self);
    fn disable_write(&mut self);
}

/// A single one-shot timer. Re-arming after it fires requires a new
/// [`Reactor::timer_arm`] call; at most one timer is ever armed for a
/// given client at a time.
pub trait Timer {
    fn cancel(&mut self);
}

/// An event the reactor delivers to its driver loop.
pub enum Event<R, T> {
    Readable(R),
    Writable(R),
    TimerFired(T),
}

/// Capabilities the connection manager and I/O driver need from the host
/// event loop: register/unregister a socket, enable/disable read and
/// write interest, and arm/cancel a one-shot timer.
pub trait Reactor {
    type Registration: Registration;
    type Timer: Timer;

    fn register(&mut self, fd: std::os::unix::io::RawFd) -> Self::Registration;
    fn unregister(&mut self, registration: Self::Registration);
    fn timer_arm(&mut self, delay: Duration) -> Self::Timer;
}

pub mod mio_adapter;
