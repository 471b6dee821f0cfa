//! # sockhub-core — platform-agnostic building blocks
//!
//! Everything the sockhub engine needs that does not touch a socket:
//!
//! | Module        | Role                                                  |
//! |---------------|-------------------------------------------------------|
//! | `arena`       | Linear allocator with checkpoint/release scopes       |
//! | `byte_ring`   | Per-client circular byte buffer                       |
//! | `chunk_queue` | Bounded SPSC ring of byte chunks (command/event queues)|
//! | `codec`       | Socket packet, command and event wire formats         |
//! | `registry`    | Fixed-capacity client set with removal-safe cursor    |
//! | `notifier`    | Cross-thread wake trait                               |
//!
//! ## Design principle
//!
//! Bounded everything. Every buffer is sized up front from the declared
//! maxima in [`codec`], and every "no room" condition is an explicit `Err`.

pub mod arena;
pub mod byte_ring;
pub mod chunk_queue;
pub mod codec;
pub mod env;
pub mod error;
pub mod id;
pub mod notifier;
pub mod registry;

pub use arena::{Arena, Scope};
pub use byte_ring::ByteRing;
pub use chunk_queue::{chunk_queue, ChunkConsumer, ChunkProducer};
pub use codec::{
    Command, Event, Frame, OwnedEvent, Recipients, CLIENT_CAPACITY_MAX, COMMAND_MAX_LEN, EVENT_MAX_LEN,
    MESSAGE_MAX_LEN, PACKET_HEADER_LEN, PACKET_MAX_LEN,
};
pub use error::{ArenaError, BufferFull, CodecError, QueueError, RegistryFull};
pub use id::ClientId;
pub use notifier::Notifier;
pub use registry::{Client, ClientRegistry, Cursor};
