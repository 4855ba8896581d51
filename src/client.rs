//! The connection manager and I/O driver: the single struct that owns a
//! managed channel's socket, buffers, timer and readiness registration,
//! and drives it through connect, handshake, steady-state I/O and
//! reconnect on failure.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::codec::Encoder;
use crate::config::{ClientConfig, Transport};
use crate::error::ClientError;
use crate::ingress::IngressBuffer;
use crate::reactor::{Reactor, Registration, Timer};
use crate::route::{Family, MessageFlags, NextHop, Prefix, RouteType, Safi, ZebraFlags};
use crate::wire::{self, Command, HEADER_SIZE};
use crate::write_queue::{WriteOutcome, WriteQueue};

/// Consecutive-failure threshold after which no further automatic
/// reconnect is scheduled.
pub const MAX_FAIL_COUNT: u32 = 10;
/// Backoff applied for the 1st and 2nd reconnect after a failure.
pub const BACKOFF_SHORT: Duration = Duration::from_secs(10);
/// Backoff applied from the 3rd consecutive failure onward.
pub const BACKOFF_LONG: Duration = Duration::from_secs(60);
/// How many consecutive failures still get the short backoff.
const SHORT_BACKOFF_THRESHOLD: u32 = 3;

/// A managed channel's lifecycle state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Dormant,
    Scheduled,
    Connecting,
    Connected,
    /// No socket, no armed timer: `fail_count` has hit [`MAX_FAIL_COUNT`]
    /// and automatic reconnection is paused until [`Client::reset`].
    Stalled,
}

/// ADD vs DELETE, for [`Client::redistribute`] and
/// [`Client::redistribute_default`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubscribeOp {
    Add,
    Delete,
}

/// A command-dispatch callback: invoked with the client (so handlers
/// can, e.g., reply or adjust subscriptions), the body length, and a
/// cursor positioned at the start of the frame body.
pub type Handler<R> = Box<dyn FnMut(&mut Client<R>, usize, &mut Cursor<&[u8]>)>;

enum Sock {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for Sock {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Sock::Unix(s) => s.read(buf),
            Sock::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Sock {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sock::Unix(s) => s.write(buf),
            Sock::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sock::Unix(s) => s.flush(),
            Sock::Tcp(s) => s.flush(),
        }
    }
}

impl AsRawFd for Sock {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Sock::Unix(s) => s.as_raw_fd(),
            Sock::Tcp(s) => s.as_raw_fd(),
        }
    }
}

enum ReadStep {
    Filled,
    Partial,
    Closed,
}

/// One managed ZAPI channel: socket, buffers, subscription state, and
/// the reconnect timer.
pub struct Client<R: Reactor> {
    config: ClientConfig,
    socket: Option<Sock>,
    ingress: IngressBuffer,
    encoder: Encoder,
    write_queue: WriteQueue,
    enabled: bool,
    fail_count: u32,
    redist_default: RouteType,
    redist: BTreeSet<RouteType>,
    default_information: bool,
    handlers: HashMap<u16, Handler<R>>,
    registration: Option<R::Registration>,
    timer: Option<R::Timer>,
    state: ConnectionState,
}

impl<R: Reactor> Client<R> {
    pub fn new(config: ClientConfig) -> Self {
        let redist_default = config.redist_default;
        Client {
            config,
            socket: None,
            ingress: IngressBuffer::new(),
            encoder: Encoder::new(),
            write_queue: WriteQueue::new(),
            enabled: false,
            fail_count: 0,
            redist_default,
            redist: BTreeSet::new(),
            default_information: false,
            handlers: HashMap::new(),
            registration: None,
            timer: None,
            state: ConnectionState::Dormant,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.socket.is_some()
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn register_handler(&mut self, command: Command, handler: Handler<R>) {
        self.handlers.insert(command.to_u16(), handler);
    }

    /// Marks the handle enabled and schedules a first connection attempt
    /// for "now".
    pub fn init(&mut self, reactor: &mut R) {
        self.enabled = true;
        self.fail_count = 0;
        self.schedule_reconnect(reactor);
    }

    /// Closes the socket, cancels timers, resets transient buffers, but
    /// preserves subscription state so a later `init` replays it in full.
    pub fn stop(&mut self, reactor: &mut R) {
        self.close_socket(reactor);
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
        self.enabled = false;
        self.state = ConnectionState::Dormant;
    }

    /// `stop` then `init`, preserving `redist_default` and all
    /// subscriptions.
    pub fn reset(&mut self, reactor: &mut R) {
        self.stop(reactor);
        self.init(reactor);
    }

    /// Called by the host event loop when this client's armed timer
    /// fires; the only timer this client schedules is the reconnect
    /// timer.
    pub fn on_timer_fire(&mut self, reactor: &mut R) {
        self.timer = None;
        if !self.enabled {
            return;
        }
        self.connect_now(reactor);
    }

    /// Called by the host event loop when the socket becomes readable.
    /// Advances the receive state machine by at most one frame.
    pub fn on_readable(&mut self, reactor: &mut R) {
        if self.socket.is_none() {
            return;
        }

        if self.ingress.end() < HEADER_SIZE {
            match self.read_into_ingress(reactor, HEADER_SIZE - self.ingress.end()) {
                ReadStep::Closed => return,
                ReadStep::Partial => {
                    self.rearm_read();
                    return;
                }
                ReadStep::Filled => {}
            }
        }

        let header = match wire::parse_header(self.ingress.filled()) {
            Ok(h) => h,
            Err(e) => {
                self.fail(reactor, e);
                return;
            }
        };
        let length = header.length as usize;
        self.ingress.ensure_capacity(length);

        if self.ingress.end() < length {
            match self.read_into_ingress(reactor, length - self.ingress.end()) {
                ReadStep::Closed => return,
                ReadStep::Partial => {
                    self.rearm_read();
                    return;
                }
                ReadStep::Filled => {}
            }
        }

        self.dispatch(header.command, length);

        if self.socket.is_some() {
            self.ingress.reset();
            self.rearm_read();
        }
    }

    /// Called by the host event loop when the socket becomes writable;
    /// drains whatever the write queue is still holding.
    pub fn on_writable(&mut self, reactor: &mut R) {
        let outcome = {
            let sock = match self.socket.as_mut() {
                Some(s) => s,
                None => return,
            };
            self.write_queue.flush(sock)
        };
        match outcome {
            Ok(WriteOutcome::Empty) => {
                if let Some(reg) = self.registration.as_mut() {
                    reg.disable_write();
                }
            }
            Ok(WriteOutcome::Pending) => {
                if let Some(reg) = self.registration.as_mut() {
                    reg.enable_write();
                }
            }
            Err(e) => self.fail(reactor, ClientError::Transport(e)),
        }
    }

    /// Idempotent subscribe/unsubscribe to a route type's redistribution:
    /// a no-op if the requested state already holds, and a no-op
    /// entirely for `redist_default` (implicitly subscribed via HELLO).
    pub fn redistribute(&mut self, reactor: &mut R, op: SubscribeOp, route_type: RouteType) {
        if route_type == self.redist_default {
            return;
        }
        let want = op == SubscribeOp::Add;
        let have = self.redist.contains(&route_type);
        if want == have {
            return;
        }
        if want {
            self.redist.insert(route_type);
        } else {
            self.redist.remove(&route_type);
        }
        if self.is_connected() {
            let frame = match op {
                SubscribeOp::Add => self.encoder.redistribute_add(route_type).to_vec(),
                SubscribeOp::Delete => self.encoder.redistribute_delete(route_type).to_vec(),
            };
            let _ = self.send_frame(reactor, &frame);
        }
    }

    /// Idempotent subscribe/unsubscribe to default-route redistribution.
    pub fn redistribute_default(&mut self, reactor: &mut R, op: SubscribeOp) {
        let want = op == SubscribeOp::Add;
        if self.default_information == want {
            return;
        }
        self.default_information = want;
        if self.is_connected() {
            let frame = match op {
                SubscribeOp::Add => self.encoder.redistribute_default_add().to_vec(),
                SubscribeOp::Delete => self.encoder.redistribute_default_delete().to_vec(),
            };
            let _ = self.send_frame(reactor, &frame);
        }
    }

    /// Announce or withdraw an IPv4/IPv6 route. Returns an error
    /// immediately if there's no socket; a mid-write transport failure
    /// instead drives the usual `fail` path and is reported by the next
    /// `is_connected() == false`.
    #[allow(clippy::too_many_arguments)]
    pub fn send_route(
        &mut self,
        reactor: &mut R,
        family: Family,
        add: bool,
        route_type: RouteType,
        zebra_flags: ZebraFlags,
        msg_flags: MessageFlags,
        safi: Safi,
        prefix: &Prefix,
        nexthops: &[NextHop],
        distance: Option<u8>,
        metric: Option<u32>,
    ) -> Result<(), ClientError> {
        let frame = self
            .encoder
            .route(family, add, route_type, zebra_flags, msg_flags, safi, prefix, nexthops, distance, metric)
            .to_vec();
        self.send_frame(reactor, &frame)
    }

    fn rearm_read(&mut self) {
        if let Some(reg) = self.registration.as_mut() {
            reg.enable_read();
        }
    }

    fn schedule_reconnect(&mut self, reactor: &mut R) {
        if self.fail_count >= MAX_FAIL_COUNT {
            log::warn!("giving up after {} consecutive connection failures", self.fail_count);
            self.state = ConnectionState::Stalled;
            return;
        }
        let delay = if self.fail_count == 0 {
            Duration::ZERO
        } else if self.fail_count < SHORT_BACKOFF_THRESHOLD {
            BACKOFF_SHORT
        } else {
            BACKOFF_LONG
        };
        self.timer = Some(reactor.timer_arm(delay));
        self.state = ConnectionState::Scheduled;
    }

    fn connect_now(&mut self, reactor: &mut R) {
        self.state = ConnectionState::Connecting;
        let result = match &self.config.transport {
            Transport::Unix { path } => UnixStream::connect(path).map(Sock::Unix),
            Transport::Tcp { port } => TcpStream::connect((Ipv4Addr::LOCALHOST, *port)).map(Sock::Tcp),
        };
        let sock = match result {
            Ok(s) => s,
            Err(e) => {
                log::warn!("connect failed: {e}");
                self.fail_count += 1;
                self.schedule_reconnect(reactor);
                return;
            }
        };
        if let Err(e) = set_nonblocking(&sock) {
            log::warn!("failed to set socket non-blocking: {e}");
            self.fail_count += 1;
            self.schedule_reconnect(reactor);
            return;
        }

        let fd = sock.as_raw_fd();
        self.socket = Some(sock);
        self.fail_count = 0;
        let mut registration = reactor.register(fd);
        registration.enable_read();
        self.registration = Some(registration);
        self.state = ConnectionState::Connected;
        log::debug!("connected");

        self.send_handshake(reactor);
    }

    /// Post-connect handshake: HELLO (only if `redist_default` is
    /// nonzero), ROUTER_ID_ADD, INTERFACE_ADD, then a REDISTRIBUTE_ADD per
    /// subscribed extra route type, then REDISTRIBUTE_DEFAULT_ADD if
    /// default-information is subscribed — each a separate frame, any of
    /// which failing drops straight into the normal failure path.
    fn send_handshake(&mut self, reactor: &mut R) {
        if self.redist_default != 0 {
            let frame = self.encoder.hello(self.redist_default).to_vec();
            if self.send_frame(reactor, &frame).is_err() {
                return;
            }
        }
        let frame = self.encoder.router_id_add().to_vec();
        if self.send_frame(reactor, &frame).is_err() {
            return;
        }
        let frame = self.encoder.interface_add().to_vec();
        if self.send_frame(reactor, &frame).is_err() {
            return;
        }
        let extras: Vec<RouteType> = self.redist.iter().copied().collect();
        for route_type in extras {
            let frame = self.encoder.redistribute_add(route_type).to_vec();
            if self.send_frame(reactor, &frame).is_err() {
                return;
            }
        }
        if self.default_information {
            let frame = self.encoder.redistribute_default_add().to_vec();
            let _ = self.send_frame(reactor, &frame);
        }
    }

    fn send_frame(&mut self, reactor: &mut R, frame: &[u8]) -> Result<(), ClientError> {
        let sock = match self.socket.as_mut() {
            Some(s) => s,
            None => {
                return Err(ClientError::Transport(io::Error::new(io::ErrorKind::NotConnected, "not connected")))
            }
        };
        match self.write_queue.write(sock, frame) {
            Ok(WriteOutcome::Empty) => {
                if let Some(reg) = self.registration.as_mut() {
                    reg.disable_write();
                }
                Ok(())
            }
            Ok(WriteOutcome::Pending) => {
                if let Some(reg) = self.registration.as_mut() {
                    reg.enable_write();
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("send failed: {e}");
                let dup = io::Error::new(e.kind(), e.to_string());
                self.fail(reactor, ClientError::Transport(dup));
                Err(ClientError::Transport(e))
            }
        }
    }

    fn read_into_ingress(&mut self, reactor: &mut R, want: usize) -> ReadStep {
        self.ingress.ensure_capacity(self.ingress.end() + want);
        let sock = match self.socket.as_mut() {
            Some(s) => s,
            None => return ReadStep::Closed,
        };
        let buf = sock_read_target(&mut self.ingress, want);
        match sock.read(buf) {
            Ok(0) => {
                self.fail(
                    reactor,
                    ClientError::Transport(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")),
                );
                ReadStep::Closed
            }
            Ok(n) => {
                self.ingress.advance_end(n);
                if n == want {
                    ReadStep::Filled
                } else {
                    ReadStep::Partial
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadStep::Partial,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => self.read_into_ingress(reactor, want),
            Err(e) => {
                self.fail(reactor, ClientError::Transport(e));
                ReadStep::Closed
            }
        }
    }

    fn dispatch(&mut self, command: u16, length: usize) {
        let body_len = length - HEADER_SIZE;
        if let Some(mut handler) = self.handlers.remove(&command) {
            let body = self.ingress.filled()[HEADER_SIZE..HEADER_SIZE + body_len].to_vec();
            let mut cursor = Cursor::new(body.as_slice());
            handler(self, body_len, &mut cursor);
            self.handlers.insert(command, handler);
        }
        // Unknown command codes are silently ignored; the frame is
        // already fully consumed from the ingress buffer.
    }

    fn fail(&mut self, reactor: &mut R, err: ClientError) {
        log::warn!("{err}");
        self.close_socket(reactor);
        self.fail_count += 1;
        self.schedule_reconnect(reactor);
    }

    fn close_socket(&mut self, reactor: &mut R) {
        if let Some(registration) = self.registration.take() {
            reactor.unregister(registration);
        }
        self.socket = None;
        self.write_queue = WriteQueue::new();
        self.ingress.reset();
    }
}

/// Borrow-splitting helper: the compiler can't see through a function
/// boundary that `spare_mut()` only touches `ingress`, so this takes
/// `&mut IngressBuffer` directly rather than `&mut self`.
fn sock_read_target(ingress: &mut IngressBuffer, want: usize) -> &mut [u8] {
    &mut ingress.spare_mut()[..want]
}

fn set_nonblocking(sock: &Sock) -> io::Result<()> {
    match sock {
        Sock::Unix(s) => s.set_nonblocking(true),
        Sock::Tcp(s) => s.set_nonblocking(true),
    }
}
