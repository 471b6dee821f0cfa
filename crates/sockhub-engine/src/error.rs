//! Engine error type.
//!
//! Per-client socket failures never surface here: they become an
//! `Event::Error` followed by `Event::Disconnect`. What does surface is
//! either an owner-side rejection (`Queue(Full)`) or a condition the loop
//! cannot continue from.

use nix::errno::Errno;
use sockhub_core::{ArenaError, BufferFull, CodecError, QueueError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    Buffer(#[from] BufferFull),

    /// A chunk read back from an internal queue did not decode.
    #[error("corrupt {channel} queue entry: {source}")]
    Corrupt {
        channel: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("OS error: {0}")]
    Os(#[from] Errno),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(&'static str),
}

impl EngineError {
    /// The command queue had no room; the command was not enqueued.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, EngineError::Queue(QueueError::Full))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_full_is_recognized() {
        assert!(EngineError::from(QueueError::Full).is_queue_full());
        assert!(!EngineError::from(QueueError::EmptyChunk).is_queue_full());
        assert!(!EngineError::Config("x").is_queue_full());
    }

    #[test]
    fn test_display() {
        let err = EngineError::Corrupt {
            channel: "event",
            source: CodecError::UnknownTag { family: "event", tag: 9 },
        };
        assert!(err.to_string().starts_with("corrupt event queue entry"));
        assert_eq!(EngineError::Os(Errno::EBADF).to_string(), format!("OS error: {}", Errno::EBADF));
    }
}
