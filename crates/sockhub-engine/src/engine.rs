//! # Engine — the single-threaded network loop
//!
//! The engine owns the listener, every client socket, the consumer end of
//! the command queue and the producer end of the event queue. One turn of
//! the loop:
//!
//! 1. Block in `epoll_wait` on the listener, the clients and the wake fd
//! 2. Service ready clients: flush pending output, read, frame, validate,
//!    emit `Message` events
//! 3. On wake: drain the command queue in FIFO order
//! 4. On listener readiness (Running only): accept up to capacity
//!
//! When accept fails for lack of descriptors or memory, the listener leaves
//! the epoll set until a client closes or `ACCEPT_RETRY` passes.
//!
//! ```text
//!   Running ──Shutdown──▶ Draining ──last client gone──▶ Stopped
//! ```
//!
//! Draining stops accepting, half-closes each client once its outbound
//! buffer is empty, and keeps reading until every peer has closed.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sockhub_core::codec::{extract_packet, packet_header};
use sockhub_core::{
    chunk_queue, Arena, ChunkConsumer, ChunkProducer, Client, ClientId, ClientRegistry, Command,
    Event, Frame, QueueError, COMMAND_MAX_LEN, EVENT_MAX_LEN, PACKET_MAX_LEN,
};
use tracing::{debug, error, info, trace, warn};

/// How long accept stays paused after running out of descriptors when no
/// client closes in the meantime.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::eventfd_notifier::EventFdNotifier;
use crate::handle::NetHandle;
use crate::poller::{Interest, Poller, Ready, Token};
use crate::stats::{bump, EngineStats};
use crate::validate::{AcceptAll, FrameValidator, Rejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HalfClose {
    Open,
    /// Shut the write side as soon as the outbound buffer is empty.
    Pending,
    Done,
}

/// Per-client socket state kept in the registry next to the byte rings.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    /// Readiness collected from the last wait, consumed by the service pass.
    ready: Ready,
    write_armed: bool,
    half_close: HalfClose,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            ready: Ready::EMPTY,
            write_armed: false,
            half_close: HalfClose::Open,
        }
    }
}

enum Outcome {
    Keep,
    Close(CloseReason),
}

enum CloseReason {
    PeerClosed,
    Failed(io::Error),
    Oversized { declared: usize },
    Rejected(&'static str),
    InboundFull,
}

/// Encodes events into the engine arena and pushes them to the owner.
struct EventSink {
    arena: Arena,
    events: ChunkProducer,
    stats: Arc<EngineStats>,
}

impl EventSink {
    /// A full event queue drops the event and counts it; only arena or
    /// codec failures are errors.
    fn emit(&mut self, event: &Event<'_>) -> Result<()> {
        let scope = self.arena.checkpoint();
        let buf = scope.alloc(EVENT_MAX_LEN)?;
        let n = event.encode(buf)?;
        let pushed = self.events.write(&buf[..n]);
        match pushed {
            Ok(()) => Ok(()),
            Err(QueueError::Full) => {
                bump(&self.stats.events_dropped, 1);
                warn!(client = %event.client_id(), kind = ?event.tag(), "event queue full, event dropped");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Everything a client operation touches besides the registry itself.
struct Io {
    poller: Poller,
    sink: EventSink,
    validator: Box<dyn FrameValidator>,
    receive_buf: Box<[u8]>,
    frame_buf: Box<[u8]>,
    stats: Arc<EngineStats>,
    /// Accept hit a resource limit; cleared by the next close or retry.
    accept_paused: bool,
}

impl Io {
    fn receive(&mut self, client: &mut Client<Connection>) -> Result<Outcome> {
        let room = self.receive_buf.len().min(client.inbound.free());
        if room == 0 {
            return Ok(Outcome::Close(CloseReason::InboundFull));
        }
        let n = match client.handle.stream.read(&mut self.receive_buf[..room]) {
            Ok(0) => return Ok(Outcome::Close(CloseReason::PeerClosed)),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return Ok(Outcome::Keep)
            }
            Err(e) => return Ok(Outcome::Close(CloseReason::Failed(e))),
        };
        client.inbound.write(&self.receive_buf[..n])?;
        bump(&self.stats.bytes_in, n as u64);
        trace!(client = %client.id(), bytes = n, "received");
        self.extract_frames(client)
    }

    /// Emit every complete frame in the inbound buffer. A trailing partial
    /// frame stays buffered.
    fn extract_frames(&mut self, client: &mut Client<Connection>) -> Result<Outcome> {
        let client_id = client.id();
        loop {
            let len = client.inbound.peek(&mut self.frame_buf);
            let (payload, consumed) = match extract_packet(&self.frame_buf[..len]) {
                Frame::Incomplete => return Ok(Outcome::Keep),
                Frame::Oversized { declared } => {
                    return Ok(Outcome::Close(CloseReason::Oversized { declared }))
                }
                Frame::Complete { payload, consumed } => (payload, consumed),
            };

            let scope = self.sink.arena.checkpoint();
            let verdict = self.validator.validate(client_id, payload, &scope);
            drop(scope);

            match verdict {
                Ok(()) => {
                    bump(&self.stats.messages_in, 1);
                    self.sink.emit(&Event::Message { client_id, payload })?;
                }
                Err(Rejection::Drop(reason)) => {
                    bump(&self.stats.frames_rejected, 1);
                    warn!(client = %client_id, len = payload.len(), reason, "frame rejected");
                }
                Err(Rejection::Disconnect(reason)) => {
                    bump(&self.stats.frames_rejected, 1);
                    return Ok(Outcome::Close(CloseReason::Rejected(reason)));
                }
            }
            client.inbound.advance(consumed);
        }
    }

    /// Frame `message` into the client's outbound buffer and try to send it.
    fn queue_packet(&mut self, client: &mut Client<Connection>, message: &[u8]) -> Result<Outcome> {
        if client.handle.half_close == HalfClose::Done {
            debug!(client = %client.id(), "write side already closed, send skipped");
            return Ok(Outcome::Keep);
        }
        let header = packet_header(message.len())?;
        if client.outbound.free() < header.len() + message.len() {
            bump(&self.stats.sends_dropped, 1);
            warn!(
                client = %client.id(),
                len = message.len(),
                pending = client.outbound.len(),
                "outbound buffer full, send dropped"
            );
            return Ok(Outcome::Keep);
        }
        client.outbound.write(&header)?;
        client.outbound.write(message)?;
        bump(&self.stats.messages_out, 1);
        self.flush(client)
    }

    /// Write as much pending output as the socket takes, keep write interest
    /// in step with what is left, and perform a pending half-close once
    /// nothing is left.
    fn flush(&mut self, client: &mut Client<Connection>) -> Result<Outcome> {
        while !client.outbound.is_empty() {
            let written = {
                let (head, _) = client.outbound.as_slices();
                client.handle.stream.write(head)
            };
            match written {
                Ok(0) => {
                    return Ok(Outcome::Close(CloseReason::Failed(io::ErrorKind::WriteZero.into())))
                }
                Ok(n) => {
                    client.outbound.advance(n);
                    bump(&self.stats.bytes_out, n as u64);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Ok(Outcome::Close(CloseReason::Failed(e))),
            }
        }

        let pending = !client.outbound.is_empty();
        if pending != client.handle.write_armed {
            let interest = if pending { Interest::READ_WRITE } else { Interest::READABLE };
            self.poller
                .modify(client.handle.stream.as_raw_fd(), Token::client(client.id()), interest)?;
            client.handle.write_armed = pending;
        }

        if !pending && client.handle.half_close == HalfClose::Pending {
            client.handle.half_close = HalfClose::Done;
            match client.handle.stream.shutdown(Shutdown::Write) {
                Ok(()) => trace!(client = %client.id(), "write side closed"),
                // Peer may already be gone; the read side reports that.
                Err(err) => debug!(client = %client.id(), error = %err, "half-close failed"),
            }
        }
        Ok(Outcome::Keep)
    }

    /// Tear down a client already removed from the registry.
    fn close(&mut self, client: Client<Connection>, reason: CloseReason) -> Result<()> {
        let client_id = client.id();
        if let Err(err) = self.poller.delete(client.handle.stream.as_raw_fd()) {
            debug!(client = %client_id, error = %err, "epoll deregistration failed");
        }
        bump(&self.stats.closes, 1);
        self.accept_paused = false;

        match reason {
            CloseReason::PeerClosed => info!(client = %client_id, "client disconnected"),
            CloseReason::Failed(err) => {
                bump(&self.stats.io_errors, 1);
                warn!(client = %client_id, error = %err, "socket error, disconnecting");
                let errno = err.raw_os_error().unwrap_or(0);
                self.sink.emit(&Event::Error { client_id, errno })?;
            }
            CloseReason::Oversized { declared } => {
                bump(&self.stats.protocol_violations, 1);
                warn!(client = %client_id, declared, max = PACKET_MAX_LEN, "oversized packet, disconnecting");
            }
            CloseReason::InboundFull => {
                bump(&self.stats.protocol_violations, 1);
                warn!(client = %client_id, "inbound buffer full, disconnecting");
            }
            CloseReason::Rejected(reason) => {
                warn!(client = %client_id, reason, "frame rejected, disconnecting");
            }
        }

        // Closes the socket.
        drop(client);
        self.sink.emit(&Event::Disconnect { client_id })
    }
}

pub struct Engine {
    mode: Mode,
    listener: TcpListener,
    /// Listener is in the epoll set.
    listening: bool,
    waker: Arc<EventFdNotifier>,
    commands: ChunkConsumer,
    command_buf: Box<[u8]>,
    registry: ClientRegistry<Connection>,
    io: Io,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("mode", &self.mode).finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine around a bound listener and the handle the owner
    /// drives it with. Nothing runs until [`run`](Self::run) or
    /// [`spawn`](Self::spawn).
    pub fn new(listener: TcpListener, config: EngineConfig) -> Result<(Engine, NetHandle)> {
        config.validate().map_err(EngineError::Config)?;
        listener.set_nonblocking(true)?;

        let poller = Poller::new(config.max_events)?;
        let waker = Arc::new(EventFdNotifier::create()?);
        poller.add(waker.as_raw_fd(), Token::WAKE, Interest::READABLE)?;
        poller.add(listener.as_raw_fd(), Token::LISTENER, Interest::READABLE)?;

        let (command_tx, command_rx) =
            chunk_queue(config.command_queue_slots, config.command_queue_bytes);
        let (event_tx, event_rx) = chunk_queue(config.event_queue_slots, config.event_queue_bytes);
        let stats = Arc::new(EngineStats::default());

        let handle = NetHandle::new(
            command_tx,
            event_rx,
            waker.clone(),
            config.arena_bytes,
            stats.clone(),
        );

        let engine = Engine {
            mode: Mode::Running,
            listener,
            listening: true,
            waker,
            commands: command_rx,
            command_buf: vec![0u8; COMMAND_MAX_LEN].into_boxed_slice(),
            registry: ClientRegistry::new(
                config.max_clients,
                config.inbound_bytes,
                config.outbound_bytes,
            ),
            io: Io {
                poller,
                sink: EventSink {
                    arena: Arena::new(config.arena_bytes),
                    events: event_tx,
                    stats: stats.clone(),
                },
                validator: Box::new(AcceptAll),
                receive_buf: vec![0u8; config.receive_bytes].into_boxed_slice(),
                frame_buf: vec![0u8; PACKET_MAX_LEN].into_boxed_slice(),
                stats,
                accept_paused: false,
            },
        };
        Ok((engine, handle))
    }

    /// Replace the default accept-everything frame validator.
    pub fn with_validator(mut self, validator: impl FrameValidator + 'static) -> Self {
        self.io.validator = Box::new(validator);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run the loop on a dedicated `sockhub-engine` thread.
    pub fn spawn(mut self) -> io::Result<thread::JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("sockhub-engine".into())
            .spawn(move || self.run())
    }

    /// Run until Stopped. Returns `Err` only for conditions the loop cannot
    /// continue from; the engine is Stopped afterwards either way.
    pub fn run(&mut self) -> Result<()> {
        info!(
            addr = ?self.listener.local_addr().ok(),
            capacity = self.registry.capacity(),
            "engine running"
        );
        while self.mode != Mode::Stopped {
            if let Err(err) = self.turn() {
                error!(error = %err, "engine loop failed");
                self.mode = Mode::Stopped;
                return Err(err);
            }
        }
        info!(stats = %self.io.stats.snapshot(), "engine stopped");
        Ok(())
    }

    fn turn(&mut self) -> Result<()> {
        let timeout = self.io.accept_paused.then_some(ACCEPT_RETRY);
        let n = self.io.poller.wait(timeout)?;
        if n == 0 && self.io.accept_paused {
            debug!("retrying accept");
            self.io.accept_paused = false;
        }
        let mut woken = false;
        let mut acceptable = false;
        for (token, ready) in self.io.poller.ready(n) {
            match token {
                Token::WAKE => woken = true,
                Token::LISTENER => acceptable = true,
                token => {
                    let Some(id) = token.as_client() else { continue };
                    if let Some(client) = self.registry.find_mut(id) {
                        client.handle.ready |= ready;
                    }
                }
            }
        }

        self.service_clients()?;
        if woken {
            self.waker.drain()?;
            self.process_commands()?;
        }
        if acceptable && self.mode == Mode::Running {
            self.accept_clients()?;
        }
        self.sync_listener()?;

        if self.mode == Mode::Draining && self.registry.is_empty() {
            info!("all clients gone, stopping");
            self.mode = Mode::Stopped;
        }
        Ok(())
    }

    fn service_clients(&mut self) -> Result<()> {
        let mut cursor = self.registry.cursor();
        while let Some(client) = self.registry.advance(&mut cursor) {
            let ready = std::mem::take(&mut client.handle.ready);
            if ready.is_empty() {
                continue;
            }
            let mut outcome = Outcome::Keep;
            if ready.is_writable() {
                outcome = self.io.flush(client)?;
            }
            if matches!(outcome, Outcome::Keep) && ready.is_readable() {
                outcome = self.io.receive(client)?;
            }
            if let Outcome::Close(reason) = outcome {
                if let Some(client) = self.registry.destroy_current(&mut cursor) {
                    self.io.close(client, reason)?;
                }
            }
        }
        Ok(())
    }

    fn accept_clients(&mut self) -> Result<()> {
        while !self.registry.is_full() {
            let (stream, peer) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    bump(&self.io.stats.accept_errors, 1);
                    if accept_error_is_transient(&e) {
                        debug!(error = %e, "incoming connection dropped during accept");
                        continue;
                    }
                    warn!(error = %e, "accept failed, pausing");
                    self.io.accept_paused = true;
                    return Ok(());
                }
            };
            if let Err(e) = stream.set_nonblocking(true) {
                bump(&self.io.stats.accept_errors, 1);
                warn!(%peer, error = %e, "could not make socket non-blocking, dropping");
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "TCP_NODELAY not set");
            }

            let fd = stream.as_raw_fd();
            let client_id = match self.registry.create(Connection::new(stream)) {
                Ok(id) => id,
                Err(full) => {
                    warn!(%peer, error = %full, "registry full, dropping connection");
                    return Ok(());
                }
            };
            self.io.poller.add(fd, Token::client(client_id), Interest::READABLE)?;
            bump(&self.io.stats.accepts, 1);
            info!(client = %client_id, %peer, "client connected");
            self.io.sink.emit(&Event::Connect { client_id })?;
        }
        debug!(
            capacity = self.registry.capacity(),
            "at capacity, leaving connections in the backlog"
        );
        Ok(())
    }

    /// Keep the listener registered exactly while new clients can be
    /// admitted. A level-triggered listener left in the set at capacity, or
    /// while accept keeps failing, would make every wait return immediately.
    fn sync_listener(&mut self) -> Result<()> {
        let wanted =
            self.mode == Mode::Running && !self.registry.is_full() && !self.io.accept_paused;
        if wanted == self.listening {
            return Ok(());
        }
        let fd = self.listener.as_raw_fd();
        if wanted {
            self.io.poller.add(fd, Token::LISTENER, Interest::READABLE)?;
            debug!("accepting connections");
        } else {
            self.io.poller.delete(fd)?;
            debug!(mode = ?self.mode, clients = self.registry.len(), "not accepting connections");
        }
        self.listening = wanted;
        Ok(())
    }

    fn process_commands(&mut self) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.command_buf);
        let result = self.drain_commands(&mut scratch);
        self.command_buf = scratch;
        result
    }

    fn drain_commands(&mut self, scratch: &mut [u8]) -> Result<()> {
        loop {
            let n = self.commands.read_into(scratch)?;
            if n == 0 {
                return Ok(());
            }
            let command = Command::decode(&scratch[..n])
                .map_err(|source| EngineError::Corrupt { channel: "command", source })?;
            trace!(?command, "command");
            self.apply(command)?;
        }
    }

    fn apply(&mut self, command: Command<'_>) -> Result<()> {
        match command {
            Command::Send { client_id, message } => self.send_to(client_id, message),
            Command::Broadcast { recipients, message } => {
                for client_id in recipients.iter() {
                    self.send_to(client_id, message)?;
                }
                Ok(())
            }
            Command::Shutdown => self.begin_draining(),
        }
    }

    fn send_to(&mut self, client_id: ClientId, message: &[u8]) -> Result<()> {
        let Some(client) = self.registry.find_mut(client_id) else {
            trace!(client = %client_id, "no such client, send skipped");
            return Ok(());
        };
        if let Outcome::Close(reason) = self.io.queue_packet(client, message)? {
            if let Some(client) = self.registry.destroy(client_id) {
                self.io.close(client, reason)?;
            }
        }
        Ok(())
    }

    fn begin_draining(&mut self) -> Result<()> {
        if self.mode != Mode::Running {
            debug!(mode = ?self.mode, "shutdown already requested");
            return Ok(());
        }
        self.mode = Mode::Draining;
        self.sync_listener()?;
        info!(clients = self.registry.len(), "shutdown requested, draining");

        let mut cursor = self.registry.cursor();
        while let Some(client) = self.registry.advance(&mut cursor) {
            client.handle.half_close = HalfClose::Pending;
            if let Outcome::Close(reason) = self.io.flush(client)? {
                if let Some(client) = self.registry.destroy_current(&mut cursor) {
                    self.io.close(client, reason)?;
                }
            }
        }
        Ok(())
    }
}

/// Failures that concern only the connection being accepted. Anything else
/// (EMFILE, ENFILE, ENOBUFS, ENOMEM, ...) would repeat on every attempt.
fn accept_error_is_transient(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ECONNABORTED | libc::EPROTO | libc::EPERM)
    )
}
