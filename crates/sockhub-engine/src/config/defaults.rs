//! Library defaults for [`EngineConfig`](super::EngineConfig).

/// Maximum concurrently connected clients
pub const MAX_CLIENTS: usize = 64;

/// Command queue: outstanding commands
pub const COMMAND_QUEUE_SLOTS: usize = 256;
/// Command queue: byte budget shared by outstanding commands
pub const COMMAND_QUEUE_BYTES: usize = 128 * 1024;

/// Event queue: outstanding events
pub const EVENT_QUEUE_SLOTS: usize = 1024;
/// Event queue: byte budget shared by outstanding events
pub const EVENT_QUEUE_BYTES: usize = 256 * 1024;

/// Scratch arena, one per side
pub const ARENA_BYTES: usize = 16 * 1024;

/// Largest single socket read
pub const RECEIVE_BYTES: usize = 10 * 1024;
/// Per-client buffer of received, not yet framed bytes
pub const INBOUND_BYTES: usize = 4 * 1024;
/// Per-client buffer of framed bytes not yet accepted by the socket
pub const OUTBOUND_BYTES: usize = 16 * 1024;

/// Readiness events fetched per `epoll_wait`
pub const MAX_EVENTS: usize = 64;
