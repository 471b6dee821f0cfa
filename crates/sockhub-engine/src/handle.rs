//! `NetHandle` — the owner's side of the engine.
//!
//! Commands are encoded into the handle's own arena and pushed onto the
//! command queue, then the engine is woken. Events are popped from the
//! event queue into a scratch buffer and decoded in place, so a returned
//! `Event` borrows the handle until the next call.

use std::fmt;
use std::sync::Arc;

use sockhub_core::{
    Arena, ChunkConsumer, ChunkProducer, ClientId, Command, Event, Notifier, Recipients,
    COMMAND_MAX_LEN, EVENT_MAX_LEN,
};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::stats::EngineStats;

pub struct NetHandle {
    commands: ChunkProducer,
    events: ChunkConsumer,
    notifier: Arc<dyn Notifier>,
    arena: Arena,
    event_buf: Box<[u8]>,
    stats: Arc<EngineStats>,
}

impl NetHandle {
    pub(crate) fn new(
        commands: ChunkProducer,
        events: ChunkConsumer,
        notifier: Arc<dyn Notifier>,
        arena_bytes: usize,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            commands,
            events,
            notifier,
            arena: Arena::new(arena_bytes),
            event_buf: vec![0u8; EVENT_MAX_LEN].into_boxed_slice(),
            stats,
        }
    }

    /// Enqueue a command and wake the engine.
    ///
    /// A full queue returns `EngineError::Queue(QueueError::Full)`: nothing
    /// was enqueued and the engine was not woken. Commands are applied in
    /// submission order.
    ///
    /// `Ok` means the command is queued. A failed wake after that is only
    /// logged: the command is picked up on the engine's next wake, and
    /// returning `Err` would invite a retry that queues it twice.
    pub fn submit(&mut self, command: &Command<'_>) -> Result<()> {
        {
            let scope = self.arena.checkpoint();
            let buf = scope.alloc(COMMAND_MAX_LEN)?;
            let n = command.encode(buf)?;
            self.commands.write(&buf[..n])?;
        }
        if let Err(err) = self.notifier.notify() {
            warn!(error = %err, "command queued but engine wake failed");
        }
        Ok(())
    }

    /// Queue `message` as one packet to `client_id`. Unknown ids are skipped
    /// by the engine.
    pub fn send(&mut self, client_id: ClientId, message: &[u8]) -> Result<()> {
        self.submit(&Command::Send { client_id, message })
    }

    /// Queue `message` as one packet to each of `recipients`.
    pub fn broadcast(&mut self, recipients: &[ClientId], message: &[u8]) -> Result<()> {
        self.submit(&Command::Broadcast {
            recipients: Recipients::from(recipients),
            message,
        })
    }

    /// Stop admitting clients, half-close every connection and stop once
    /// all peers have gone.
    pub fn request_shutdown(&mut self) -> Result<()> {
        self.submit(&Command::Shutdown)
    }

    /// Next event, or `None` if the queue is empty. Never blocks.
    pub fn poll_next(&mut self) -> Result<Option<Event<'_>>> {
        let n = self.events.read_into(&mut self.event_buf)?;
        if n == 0 {
            return Ok(None);
        }
        let event = Event::decode(&self.event_buf[..n])
            .map_err(|source| EngineError::Corrupt { channel: "event", source })?;
        Ok(Some(event))
    }

    /// Events waiting to be polled.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Commands the engine has not picked up yet.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

impl fmt::Debug for NetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetHandle")
            .field("commands", &self.commands)
            .field("events", &self.events)
            .field("arena", &self.arena)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockhub_core::{chunk_queue, QueueError};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    impl Notifier for CountingNotifier {
        fn notify(&self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn handle(slots: usize) -> (NetHandle, ChunkConsumer, ChunkProducer, Arc<CountingNotifier>) {
        let (cmd_tx, cmd_rx) = chunk_queue(slots, COMMAND_MAX_LEN * slots);
        let (ev_tx, ev_rx) = chunk_queue(8, EVENT_MAX_LEN * 8);
        let notifier = Arc::new(CountingNotifier::default());
        let h = NetHandle::new(cmd_tx, ev_rx, notifier.clone(), COMMAND_MAX_LEN, Arc::default());
        (h, cmd_rx, ev_tx, notifier)
    }

    #[test]
    fn test_submit_encodes_and_wakes() {
        let (mut h, mut rx, _, notifier) = handle(4);
        h.send(ClientId::new(1), b"HELLO").unwrap();
        h.request_shutdown().unwrap();
        assert_eq!(notifier.0.load(Ordering::Relaxed), 2);
        assert_eq!(h.pending_commands(), 2);

        let mut buf = [0u8; COMMAND_MAX_LEN];
        let n = rx.read_into(&mut buf).unwrap();
        assert_eq!(
            Command::decode(&buf[..n]).unwrap(),
            Command::Send { client_id: ClientId::new(1), message: b"HELLO" }
        );
        let n = rx.read_into(&mut buf).unwrap();
        assert_eq!(Command::decode(&buf[..n]).unwrap(), Command::Shutdown);
    }

    #[test]
    fn test_full_queue_rejects_without_wake() {
        let (mut h, mut rx, _, notifier) = handle(2);
        h.send(ClientId::new(1), b"a").unwrap();
        h.send(ClientId::new(1), b"b").unwrap();
        let err = h.send(ClientId::new(1), b"c").unwrap_err();
        assert!(err.is_queue_full(), "{err}");
        assert_eq!(notifier.0.load(Ordering::Relaxed), 2);

        // Earlier commands are intact.
        let mut buf = [0u8; COMMAND_MAX_LEN];
        let n = rx.read_into(&mut buf).unwrap();
        assert_eq!(
            Command::decode(&buf[..n]).unwrap(),
            Command::Send { client_id: ClientId::new(1), message: b"a" }
        );
        assert!(matches!(err, EngineError::Queue(QueueError::Full)));
    }

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&self) -> io::Result<()> {
            Err(io::Error::from_raw_os_error(libc::EBADF))
        }
    }

    #[test]
    fn test_failed_wake_still_reports_queued_once() {
        let (cmd_tx, mut cmd_rx) = chunk_queue(4, COMMAND_MAX_LEN * 4);
        let (_ev_tx, ev_rx) = chunk_queue(2, EVENT_MAX_LEN * 2);
        let mut h = NetHandle::new(
            cmd_tx,
            ev_rx,
            Arc::new(BrokenNotifier),
            COMMAND_MAX_LEN,
            Arc::default(),
        );

        h.send(ClientId::new(1), b"once").unwrap();
        assert_eq!(h.pending_commands(), 1);

        let mut buf = [0u8; COMMAND_MAX_LEN];
        let n = cmd_rx.read_into(&mut buf).unwrap();
        assert_eq!(
            Command::decode(&buf[..n]).unwrap(),
            Command::Send { client_id: ClientId::new(1), message: b"once" }
        );
        assert_eq!(cmd_rx.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let (mut h, _, _, notifier) = handle(2);
        let big = vec![0u8; sockhub_core::MESSAGE_MAX_LEN + 1];
        assert!(matches!(h.send(ClientId::new(1), &big), Err(EngineError::Codec(_))));
        assert_eq!(notifier.0.load(Ordering::Relaxed), 0);
        assert_eq!(h.pending_commands(), 0);
    }

    #[test]
    fn test_poll_next_decodes_in_order() {
        let (mut h, _, mut tx, _) = handle(2);
        assert!(h.poll_next().unwrap().is_none());

        let mut buf = [0u8; EVENT_MAX_LEN];
        for event in [
            Event::Connect { client_id: ClientId::new(1) },
            Event::Message { client_id: ClientId::new(1), payload: b"PING" },
        ] {
            let n = event.encode(&mut buf).unwrap();
            tx.write(&buf[..n]).unwrap();
        }
        assert_eq!(h.pending_events(), 2);
        assert_eq!(h.poll_next().unwrap(), Some(Event::Connect { client_id: ClientId::new(1) }));
        assert_eq!(
            h.poll_next().unwrap(),
            Some(Event::Message { client_id: ClientId::new(1), payload: b"PING" })
        );
        assert!(h.poll_next().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_event_is_reported() {
        let (mut h, _, mut tx, _) = handle(2);
        tx.write(&[0xEE, 1, 0, 0, 0]).unwrap();
        assert!(matches!(
            h.poll_next(),
            Err(EngineError::Corrupt { channel: "event", .. })
        ));
    }
}
