//! End-to-end behaviour over loopback TCP.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sockhub_engine::{
    ClientId, Engine, EngineConfig, EngineError, NetHandle, OwnedEvent, Rejection, Scope,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct Harness {
    handle: NetHandle,
    addr: SocketAddr,
    thread: Option<JoinHandle<Result<(), EngineError>>>,
}

fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

fn start(config: EngineConfig) -> Harness {
    let (engine, handle) = Engine::new(bind(), config).unwrap();
    Harness::launch(engine, handle)
}

impl Harness {
    fn launch(engine: Engine, handle: NetHandle) -> Harness {
        let addr = engine.local_addr().unwrap();
        let thread = engine.spawn().unwrap();
        Harness { handle, addr, thread: Some(thread) }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();
        stream
    }

    fn next_event(&mut self) -> OwnedEvent {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(event) = self.handle.poll_next().unwrap() {
                return event.into_owned();
            }
            assert!(Instant::now() < deadline, "timed out waiting for an event");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn assert_quiet(&mut self, period: Duration) {
        thread::sleep(period);
        if let Some(event) = self.handle.poll_next().unwrap() {
            panic!("unexpected event {:?}", event);
        }
    }

    fn wait_until(&self, what: &str, cond: impl Fn(&NetHandle) -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        while !cond(&self.handle) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn join(&mut self) {
        let thread = self.thread.take().expect("engine already joined");
        thread.join().expect("engine thread panicked").unwrap();
    }

    fn stop(mut self) {
        self.handle.request_shutdown().unwrap();
        self.join();
    }
}

fn id(n: u32) -> ClientId {
    ClientId::new(n)
}

fn connect_event(n: u32) -> OwnedEvent {
    OwnedEvent::Connect { client_id: id(n) }
}

fn disconnect_event(n: u32) -> OwnedEvent {
    OwnedEvent::Disconnect { client_id: id(n) }
}

fn message_event(n: u32, payload: &[u8]) -> OwnedEvent {
    OwnedEvent::Message { client_id: id(n), payload: payload.to_vec() }
}

fn packet(payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u16).to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

fn read_packet(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; u16::from_le_bytes(header) as usize];
    stream.read_exact(&mut payload).unwrap();
    payload
}

fn assert_eof(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    assert_eq!(stream.read(&mut buf).unwrap(), 0, "expected the engine to close its write side");
}

#[test]
fn test_connect_message_disconnect() {
    let mut h = start(EngineConfig::new());
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    client.write_all(&[0x04, 0x00, b'P', b'I', b'N', b'G']).unwrap();
    assert_eq!(h.next_event(), message_event(1, b"PING"));

    drop(client);
    assert_eq!(h.next_event(), disconnect_event(1));
    h.stop();
}

#[test]
fn test_send_to_unknown_client_is_ignored() {
    let mut h = start(EngineConfig::new());
    h.handle.send(id(1), b"HELLO").unwrap();
    h.wait_until("command pickup", |handle| handle.pending_commands() == 0);
    h.assert_quiet(QUIET);
    assert_eq!(h.handle.stats().snapshot().messages_out, 0);
    h.stop();
}

#[test]
fn test_graceful_shutdown() {
    let mut h = start(EngineConfig::new());
    let mut a = h.connect();
    assert_eq!(h.next_event(), connect_event(1));
    let mut b = h.connect();
    assert_eq!(h.next_event(), connect_event(2));

    h.handle.request_shutdown().unwrap();
    assert_eof(&mut a);
    assert_eof(&mut b);

    // Reads continue while draining.
    a.write_all(&packet(b"bye")).unwrap();
    assert_eq!(h.next_event(), message_event(1, b"bye"));

    // Not admitted: no Connect event.
    let _late = TcpStream::connect(h.addr);
    h.assert_quiet(QUIET);

    drop(a);
    assert_eq!(h.next_event(), disconnect_event(1));
    drop(b);
    assert_eq!(h.next_event(), disconnect_event(2));
    h.join();
}

#[test]
fn test_partial_frame_waits_for_rest() {
    let mut h = start(EngineConfig::new());
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    client.write_all(&[0x0A, 0x00, b'a', b'b', b'c', b'd']).unwrap();
    h.assert_quiet(QUIET);

    client.write_all(b"efghij").unwrap();
    assert_eq!(h.next_event(), message_event(1, b"abcdefghij"));
    drop(client);
    assert_eq!(h.next_event(), disconnect_event(1));
    h.stop();
}

#[test]
fn test_byte_at_a_time_delivery() {
    let mut h = start(EngineConfig::new());
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    let mut wire = packet(b"one");
    wire.extend(packet(b""));
    wire.extend(packet(b"three"));
    for byte in wire {
        client.write_all(&[byte]).unwrap();
        client.flush().unwrap();
    }
    assert_eq!(h.next_event(), message_event(1, b"one"));
    assert_eq!(h.next_event(), message_event(1, b""));
    assert_eq!(h.next_event(), message_event(1, b"three"));
    h.stop();
}

#[test]
fn test_send_and_broadcast_reach_clients() {
    let mut h = start(EngineConfig::new());
    let mut a = h.connect();
    assert_eq!(h.next_event(), connect_event(1));
    let mut b = h.connect();
    assert_eq!(h.next_event(), connect_event(2));

    h.handle.send(id(1), b"HELLO").unwrap();
    assert_eq!(read_packet(&mut a), b"HELLO");

    h.handle.broadcast(&[id(1), id(99), id(2)], b"all").unwrap();
    assert_eq!(read_packet(&mut a), b"all");
    assert_eq!(read_packet(&mut b), b"all");

    for n in 0..3u8 {
        h.handle.send(id(2), &[n]).unwrap();
    }
    for n in 0..3u8 {
        assert_eq!(read_packet(&mut b), [n]);
    }
    assert_eq!(h.handle.stats().snapshot().messages_out, 6);
    h.stop();
}

#[test]
fn test_pending_send_is_delivered_before_half_close() {
    let mut h = start(EngineConfig::new());
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    h.handle.send(id(1), b"last words").unwrap();
    h.handle.request_shutdown().unwrap();
    assert_eq!(read_packet(&mut client), b"last words");
    assert_eof(&mut client);

    drop(client);
    assert_eq!(h.next_event(), disconnect_event(1));
    h.join();
}

#[test]
fn test_oversized_packet_disconnects() {
    let mut h = start(EngineConfig::new());
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    client.write_all(&[0xFF, 0xFF, 1, 2, 3]).unwrap();
    assert_eq!(h.next_event(), disconnect_event(1));
    assert_eq!(h.handle.stats().snapshot().protocol_violations, 1);
    h.stop();
}

#[test]
fn test_connection_reset_reports_error() {
    let mut h = start(EngineConfig::new());
    let client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    // SO_LINGER with a zero timeout turns close into a reset.
    let linger = libc::linger { l_onoff: 1, l_linger: 0 };
    let ret = unsafe {
        libc::setsockopt(
            client.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    assert_eq!(ret, 0);
    drop(client);

    assert_eq!(
        h.next_event(),
        OwnedEvent::Error { client_id: id(1), errno: libc::ECONNRESET }
    );
    assert_eq!(h.next_event(), disconnect_event(1));
    assert_eq!(h.handle.stats().snapshot().io_errors, 1);
    h.stop();
}

#[test]
fn test_capacity_leaves_connections_pending() {
    let mut h = start(EngineConfig::new().max_clients(1));
    let first = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    let _second = h.connect();
    h.assert_quiet(QUIET);

    drop(first);
    assert_eq!(h.next_event(), disconnect_event(1));
    assert_eq!(h.next_event(), connect_event(2));
    h.stop();
}

#[test]
fn test_full_command_queue_rejects_submit() {
    let (_engine, mut handle) =
        Engine::new(bind(), EngineConfig::new().command_queue(2, 8 * 1024)).unwrap();
    handle.send(id(1), b"a").unwrap();
    handle.send(id(1), b"b").unwrap();
    let err = handle.send(id(1), b"c").unwrap_err();
    assert!(err.is_queue_full(), "{err}");
    assert_eq!(handle.pending_commands(), 2);
}

#[test]
fn test_full_event_queue_drops_and_counts() {
    let mut h = start(EngineConfig::new().event_queue(2, 4 * 1024));
    let mut client = h.connect();
    h.wait_until("connect", |handle| handle.stats().snapshot().accepts == 1);

    for n in 0..5u8 {
        client.write_all(&packet(&[n])).unwrap();
    }
    // Connect plus the first message fit; the rest are dropped.
    h.wait_until("dropped events", |handle| handle.stats().snapshot().events_dropped == 4);
    assert_eq!(h.handle.stats().snapshot().messages_in, 5);
    assert_eq!(h.next_event(), connect_event(1));
    assert_eq!(h.next_event(), message_event(1, &[0]));
    h.assert_quiet(QUIET);
    h.stop();
}

#[test]
fn test_validator_drops_and_disconnects() {
    let validator = |_: ClientId, payload: &[u8], scratch: &Scope<'_>| {
        if payload == b"QUIT" {
            return Err(Rejection::Disconnect("quit requested"));
        }
        let upper = scratch.alloc(payload.len()).map_err(|_| Rejection::Drop("no scratch"))?;
        upper.copy_from_slice(payload);
        upper.make_ascii_uppercase();
        if upper != payload {
            return Err(Rejection::Drop("lowercase"));
        }
        Ok(())
    };
    let (engine, handle) = Engine::new(bind(), EngineConfig::new()).unwrap();
    let mut h = Harness::launch(engine.with_validator(validator), handle);
    let mut client = h.connect();
    assert_eq!(h.next_event(), connect_event(1));

    client.write_all(&packet(b"quiet")).unwrap();
    client.write_all(&packet(b"LOUD")).unwrap();
    assert_eq!(h.next_event(), message_event(1, b"LOUD"));
    assert_eq!(h.handle.stats().snapshot().frames_rejected, 1);

    client.write_all(&packet(b"QUIT")).unwrap();
    assert_eq!(h.next_event(), disconnect_event(1));
    assert_eof(&mut client);
    h.stop();
}
