//! End-to-end tests driving [`zclient::Client`] over a real UNIX socket
//! with the `mio`-backed reactor: handshake replay order, reconnect on
//! a framing error, and frame-boundary edge cases.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::rc::Rc;
use std::time::Duration;

use zclient::reactor::Event;
use zclient::{Client, ClientConfig, ConnectionState, MioReactor, SubscribeOp};

fn temp_socket_path(tag: &str) -> std::path::PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut p = std::env::temp_dir();
    p.push(format!("zclient-it-{tag}-{}-{:?}", std::process::id(), std::thread::current().id()));
    std::fs::remove_file(&p).ok();
    p
}

/// Drives `reactor`/`client` until `done` returns true or `deadline`
/// elapses, routing every event back into the client regardless of
/// which socket raised it (there's only ever one registration in these
/// tests).
fn drive<F: Fn() -> bool>(client: &mut Client<MioReactor>, reactor: &mut MioReactor, done: F) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !done() && std::time::Instant::now() < deadline {
        let events = reactor.poll(Some(Duration::from_millis(50))).unwrap();
        for ev in events {
            match ev {
                Event::Readable(_) => client.on_readable(reactor),
                Event::Writable(_) => client.on_writable(reactor),
                Event::TimerFired(_) => client.on_timer_fire(reactor),
            }
        }
    }
}

fn accept_nonblocking(listener: &UnixListener) -> Option<UnixStream> {
    listener.set_nonblocking(true).unwrap();
    match listener.accept() {
        Ok((s, _)) => Some(s),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
        Err(e) => panic!("accept failed: {e}"),
    }
}

fn read_available(peer: &mut UnixStream) -> Vec<u8> {
    peer.set_nonblocking(true).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match peer.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => panic!("read failed: {e}"),
        }
    }
    out
}

/// Subscriptions registered before `init` are replayed in a fixed order
/// on the handshake that follows a fresh connect.
#[test]
fn handshake_replays_subscriptions_in_a_fixed_order() {
    let path = temp_socket_path("handshake-order");
    let listener = UnixListener::bind(&path).unwrap();

    let mut reactor = MioReactor::new().unwrap();
    let config = ClientConfig::unix_path(&path, 9).unwrap();
    let mut client: Client<MioReactor> = Client::new(config);
    client.redistribute(&mut reactor, SubscribeOp::Add, 2);
    client.redistribute(&mut reactor, SubscribeOp::Add, 5);
    client.redistribute_default(&mut reactor, SubscribeOp::Add);

    client.init(&mut reactor);
    drive(&mut client, &mut reactor, || client.is_connected());
    assert!(client.is_connected());

    let mut peer = loop {
        if let Some(p) = accept_nonblocking(&listener) {
            break p;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    let bytes = loop {
        let b = read_available(&mut peer);
        // HELLO(7) + ROUTER_ID_ADD(6) + INTERFACE_ADD(6) + 2*REDISTRIBUTE_ADD(7) + REDISTRIBUTE_DEFAULT_ADD(6) = 40
        if b.len() >= 40 {
            break b;
        }
        std::thread::sleep(Duration::from_millis(5));
    };

    let mut commands = Vec::new();
    let mut route_types = Vec::new();
    let mut i = 0;
    while i + 6 <= bytes.len() {
        let length = u16::from_be_bytes([bytes[i], bytes[i + 1]]) as usize;
        let command = u16::from_be_bytes([bytes[i + 4], bytes[i + 5]]);
        commands.push(command);
        if command == 11 {
            route_types.push(bytes[i + 6]);
        }
        i += length;
    }

    assert_eq!(commands, vec![0x17, 0x0C, 1, 11, 11, 13]);
    assert_eq!(route_types, vec![2, 5]);

    std::fs::remove_file(&path).ok();
}

/// A bad marker closes the socket and bumps fail_count by one.
#[test]
fn framing_error_triggers_reconnect_and_fail_count() {
    let path = temp_socket_path("framing-error");
    let listener = UnixListener::bind(&path).unwrap();

    let mut reactor = MioReactor::new().unwrap();
    let config = ClientConfig::unix_path(&path, 0).unwrap();
    let mut client: Client<MioReactor> = Client::new(config);
    client.init(&mut reactor);
    drive(&mut client, &mut reactor, || client.is_connected());
    assert!(client.is_connected());

    let mut peer = accept_nonblocking(&listener).unwrap_or_else(|| {
        std::thread::sleep(Duration::from_millis(20));
        accept_nonblocking(&listener).unwrap()
    });
    peer.write_all(&[0x00, 0x06, 0x00, 0x03, 0x00, 0x00]).unwrap();

    drive(&mut client, &mut reactor, || client.fail_count() > 0);
    assert_eq!(client.fail_count(), 1);
    assert_eq!(client.state(), ConnectionState::Scheduled);

    std::fs::remove_file(&path).ok();
}

/// Boundary: a frame delivered split across two readable events still
/// dispatches exactly once.
#[test]
fn split_frame_dispatches_exactly_once() {
    let path = temp_socket_path("split");
    let listener = UnixListener::bind(&path).unwrap();

    let mut reactor = MioReactor::new().unwrap();
    let config = ClientConfig::unix_path(&path, 0).unwrap();
    let mut client: Client<MioReactor> = Client::new(config);

    let hits = Rc::new(RefCell::new(0usize));
    let hits_clone = hits.clone();
    client.register_handler(
        zclient::Command::RouterIdDelete,
        Box::new(move |_client, body_len, _cursor| {
            assert_eq!(body_len, 0);
            *hits_clone.borrow_mut() += 1;
        }),
    );

    client.init(&mut reactor);
    drive(&mut client, &mut reactor, || client.is_connected());
    let mut peer = accept_nonblocking(&listener).unwrap_or_else(|| {
        std::thread::sleep(Duration::from_millis(20));
        accept_nonblocking(&listener).unwrap()
    });
    // drain the handshake so its bytes don't interfere with this test's socket state
    std::thread::sleep(Duration::from_millis(20));
    read_available(&mut peer);

    // ROUTER_ID_DELETE (0x0D), empty body: [00 06 FE 03 00 0D]
    let frame = [0x00u8, 0x06, 0xFE, 0x03, 0x00, 0x0D];
    peer.write_all(&frame[..3]).unwrap();
    client.on_readable(&mut reactor);
    std::thread::sleep(Duration::from_millis(20));
    peer.write_all(&frame[3..]).unwrap();

    drive(&mut client, &mut reactor, || *hits.borrow() >= 1);
    assert_eq!(*hits.borrow(), 1);

    std::fs::remove_file(&path).ok();
}

/// A frame with length exactly HEADER_SIZE and no body still dispatches,
/// with body-length reported as 0.
#[test]
fn empty_body_frame_dispatches_with_zero_length() {
    let path = temp_socket_path("empty-body");
    let listener = UnixListener::bind(&path).unwrap();

    let mut reactor = MioReactor::new().unwrap();
    let config = ClientConfig::unix_path(&path, 0).unwrap();
    let mut client: Client<MioReactor> = Client::new(config);

    let seen_len = Rc::new(RefCell::new(None));
    let seen_len_clone = seen_len.clone();
    client.register_handler(
        zclient::Command::RouterIdDelete,
        Box::new(move |_client, body_len, _cursor| {
            *seen_len_clone.borrow_mut() = Some(body_len);
        }),
    );

    client.init(&mut reactor);
    drive(&mut client, &mut reactor, || client.is_connected());
    let mut peer = accept_nonblocking(&listener).unwrap_or_else(|| {
        std::thread::sleep(Duration::from_millis(20));
        accept_nonblocking(&listener).unwrap()
    });
    std::thread::sleep(Duration::from_millis(20));
    read_available(&mut peer);

    peer.write_all(&[0x00, 0x06, 0xFE, 0x03, 0x00, 0x0D]).unwrap();
    drive(&mut client, &mut reactor, || seen_len.borrow().is_some());
    assert_eq!(*seen_len.borrow(), Some(0));

    std::fs::remove_file(&path).ok();
}
