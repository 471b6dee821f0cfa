//! Engine configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use sockhub_engine::EngineConfig;
//!
//! // Defaults with env overrides
//! let config = EngineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = EngineConfig::new()
//!     .max_clients(8)
//!     .outbound_bytes(64 * 1024);
//! ```

pub mod defaults;

use sockhub_core::env::env_get;
use sockhub_core::{CLIENT_CAPACITY_MAX, COMMAND_MAX_LEN, EVENT_MAX_LEN, PACKET_MAX_LEN};

/// Engine sizing. Every buffer the engine and its handle use is allocated
/// from these numbers once, at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum concurrently connected clients
    pub max_clients: usize,
    /// Command queue slot count
    pub command_queue_slots: usize,
    /// Command queue byte budget
    pub command_queue_bytes: usize,
    /// Event queue slot count
    pub event_queue_slots: usize,
    /// Event queue byte budget
    pub event_queue_bytes: usize,
    /// Scratch arena size (engine side and handle side each get one)
    pub arena_bytes: usize,
    /// Largest single socket read
    pub receive_bytes: usize,
    /// Per-client inbound byte ring
    pub inbound_bytes: usize,
    /// Per-client outbound byte ring
    pub outbound_bytes: usize,
    /// Readiness events fetched per wait
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Library defaults overridden by the environment.
    ///
    /// Environment variables (all optional):
    /// - `SOCKHUB_MAX_CLIENTS`
    /// - `SOCKHUB_COMMAND_QUEUE_SLOTS`, `SOCKHUB_COMMAND_QUEUE_BYTES`
    /// - `SOCKHUB_EVENT_QUEUE_SLOTS`, `SOCKHUB_EVENT_QUEUE_BYTES`
    /// - `SOCKHUB_ARENA_BYTES`
    /// - `SOCKHUB_RECEIVE_BYTES`
    /// - `SOCKHUB_INBOUND_BYTES`, `SOCKHUB_OUTBOUND_BYTES`
    /// - `SOCKHUB_MAX_EVENTS`
    pub fn from_env() -> Self {
        Self {
            max_clients: env_get("SOCKHUB_MAX_CLIENTS", defaults::MAX_CLIENTS),
            command_queue_slots: env_get(
                "SOCKHUB_COMMAND_QUEUE_SLOTS",
                defaults::COMMAND_QUEUE_SLOTS,
            ),
            command_queue_bytes: env_get(
                "SOCKHUB_COMMAND_QUEUE_BYTES",
                defaults::COMMAND_QUEUE_BYTES,
            ),
            event_queue_slots: env_get("SOCKHUB_EVENT_QUEUE_SLOTS", defaults::EVENT_QUEUE_SLOTS),
            event_queue_bytes: env_get("SOCKHUB_EVENT_QUEUE_BYTES", defaults::EVENT_QUEUE_BYTES),
            arena_bytes: env_get("SOCKHUB_ARENA_BYTES", defaults::ARENA_BYTES),
            receive_bytes: env_get("SOCKHUB_RECEIVE_BYTES", defaults::RECEIVE_BYTES),
            inbound_bytes: env_get("SOCKHUB_INBOUND_BYTES", defaults::INBOUND_BYTES),
            outbound_bytes: env_get("SOCKHUB_OUTBOUND_BYTES", defaults::OUTBOUND_BYTES),
            max_events: env_get("SOCKHUB_MAX_EVENTS", defaults::MAX_EVENTS),
        }
    }

    /// Library defaults only, no env override.
    pub fn new() -> Self {
        Self {
            max_clients: defaults::MAX_CLIENTS,
            command_queue_slots: defaults::COMMAND_QUEUE_SLOTS,
            command_queue_bytes: defaults::COMMAND_QUEUE_BYTES,
            event_queue_slots: defaults::EVENT_QUEUE_SLOTS,
            event_queue_bytes: defaults::EVENT_QUEUE_BYTES,
            arena_bytes: defaults::ARENA_BYTES,
            receive_bytes: defaults::RECEIVE_BYTES,
            inbound_bytes: defaults::INBOUND_BYTES,
            outbound_bytes: defaults::OUTBOUND_BYTES,
            max_events: defaults::MAX_EVENTS,
        }
    }

    // Builder methods

    pub fn max_clients(mut self, n: usize) -> Self {
        self.max_clients = n;
        self
    }

    pub fn command_queue(mut self, slots: usize, bytes: usize) -> Self {
        self.command_queue_slots = slots;
        self.command_queue_bytes = bytes;
        self
    }

    pub fn event_queue(mut self, slots: usize, bytes: usize) -> Self {
        self.event_queue_slots = slots;
        self.event_queue_bytes = bytes;
        self
    }

    pub fn arena_bytes(mut self, size: usize) -> Self {
        self.arena_bytes = size;
        self
    }

    pub fn receive_bytes(mut self, size: usize) -> Self {
        self.receive_bytes = size;
        self
    }

    pub fn inbound_bytes(mut self, size: usize) -> Self {
        self.inbound_bytes = size;
        self
    }

    pub fn outbound_bytes(mut self, size: usize) -> Self {
        self.outbound_bytes = size;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    /// Reject sizes the engine could deadlock or fail on at runtime.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_clients == 0 || self.max_clients > CLIENT_CAPACITY_MAX {
            return Err("max_clients must be in 1..=CLIENT_CAPACITY_MAX");
        }
        if self.command_queue_slots == 0 || self.event_queue_slots == 0 {
            return Err("queue slot counts must be > 0");
        }
        if self.command_queue_bytes < COMMAND_MAX_LEN {
            return Err("command_queue_bytes must be >= COMMAND_MAX_LEN");
        }
        if self.event_queue_bytes < EVENT_MAX_LEN {
            return Err("event_queue_bytes must be >= EVENT_MAX_LEN");
        }
        if self.arena_bytes < COMMAND_MAX_LEN.max(EVENT_MAX_LEN) {
            return Err("arena_bytes must hold the largest command or event");
        }
        if self.receive_bytes == 0 {
            return Err("receive_bytes must be > 0");
        }
        // A partial frame can be at most one byte short of a full packet.
        if self.inbound_bytes < PACKET_MAX_LEN {
            return Err("inbound_bytes must be >= PACKET_MAX_LEN");
        }
        if self.outbound_bytes < PACKET_MAX_LEN {
            return Err("outbound_bytes must be >= PACKET_MAX_LEN");
        }
        if self.max_events == 0 {
            return Err("max_events must be > 0");
        }
        Ok(())
    }
}
