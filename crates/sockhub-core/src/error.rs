//! Core error types.

use thiserror::Error;

/// Arena allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// Not enough room left in the arena. Nothing was allocated.
    #[error("arena out of memory: requested {requested} bytes, {remaining} remaining")]
    OutOfMemory { requested: usize, remaining: usize },
    /// Allocation attempted on a scope that has a live nested scope.
    #[error("arena scope at depth {scope} is shadowed by depth {active}")]
    ScopeShadowed { scope: usize, active: usize },
}

/// Byte ring has no room for the whole write. Nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("byte buffer full: {requested} bytes requested, {free} free")]
pub struct BufferFull {
    pub requested: usize,
    pub free: usize,
}

/// Chunk queue failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Slot count or byte budget would be exceeded.
    #[error("chunk queue full")]
    Full,
    /// Zero-length chunks cannot be distinguished from "no data".
    #[error("empty chunk")]
    EmptyChunk,
    /// Chunk is larger than the whole backing buffer.
    #[error("chunk of {len} bytes exceeds queue capacity of {capacity} bytes")]
    TooLarge { len: usize, capacity: usize },
    /// The oldest chunk does not fit the caller's scratch buffer.
    #[error("chunk of {len} bytes does not fit {scratch} byte scratch buffer")]
    ScratchTooSmall { len: usize, scratch: usize },
}

/// Wire codec failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unknown {family} tag {tag}")]
    UnknownTag { family: &'static str, tag: u8 },
    #[error("truncated {family}: need {needed} bytes, have {available}")]
    Truncated {
        family: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("{what} length {len} exceeds maximum {max}")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Client registry is at capacity; the connection was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client registry full ({capacity} clients)")]
pub struct RegistryFull {
    pub capacity: usize,
}
