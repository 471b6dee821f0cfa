//! Cross-thread wake abstraction.
//!
//! A `Notifier` interrupts the engine's blocking readiness wait after the
//! owner has queued commands.
//!
//! # Implementors
//!
//! - `EventFdNotifier` (sockhub-engine): writes 1 to an eventfd that the
//!   engine's epoll set watches next to the client sockets.

use std::io;

/// Wakes the engine when commands are pending.
///
/// **Contract:**
/// - `notify()` must NEVER block.
/// - Multiple calls before the engine wakes are coalesced
///   (eventfd semantics: counter increments, one read drains).
/// - Called after the command is visible in the queue, never before.
pub trait Notifier: Send + Sync {
    /// Signal that new commands are available.
    fn notify(&self) -> io::Result<()>;
}
