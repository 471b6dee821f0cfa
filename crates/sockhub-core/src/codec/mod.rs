//! Wire codec — socket packets, commands, events.
//!
//! Every layout is a leading tag (or length, for packets) followed by
//! fixed-width fields and at most one length-prefixed byte span. All
//! integers are little-endian.
//!
//! ```text
//! Packet     [len:u16][payload:len]
//! Command    [tag:u8] Broadcast [count:u16][id:u32 × count][len:u16][msg]
//!                     Send      [id:u32][len:u16][msg]
//!                     Shutdown
//! Event      [tag:u8] Connect    [id:u32]
//!                     Disconnect [id:u32]
//!                     Message    [id:u32][len:u16][payload]
//!                     Error      [id:u32][errno:i32]
//! ```
//!
//! The `*_MAX_LEN` constants bound each family's serialized size and are
//! what callers size scratch buffers and arena checkpoints with.

pub mod packet;
pub mod command;
pub mod event;

use crate::error::CodecError;
use crate::id::ClientId;

/// Bytes of the packet length header.
pub const PACKET_HEADER_LEN: usize = 2;
/// Largest packet on the wire, header included.
pub const PACKET_MAX_LEN: usize = 512;
/// Largest application message carried in a packet, command or event.
pub const MESSAGE_MAX_LEN: usize = PACKET_MAX_LEN - PACKET_HEADER_LEN;
/// Hard upper bound on concurrently registered clients.
pub const CLIENT_CAPACITY_MAX: usize = 256;
/// Most recipients one broadcast command may name.
pub const BROADCAST_MAX_RECIPIENTS: usize = CLIENT_CAPACITY_MAX;

const TAG_LEN: usize = 1;
const SPAN_LEN: usize = 2;
const COUNT_LEN: usize = 2;

/// Largest serialized command (a broadcast to every possible client).
pub const COMMAND_MAX_LEN: usize = TAG_LEN
    + COUNT_LEN
    + BROADCAST_MAX_RECIPIENTS * ClientId::ENCODED_LEN
    + SPAN_LEN
    + MESSAGE_MAX_LEN;

/// Largest serialized event (a message event at full payload).
pub const EVENT_MAX_LEN: usize = TAG_LEN + ClientId::ENCODED_LEN + SPAN_LEN + MESSAGE_MAX_LEN;

pub use command::{Command, CommandTag, Recipients};
pub use event::{Event, EventTag, OwnedEvent};
pub use packet::{encode_packet, extract_packet, packet_header, Frame};

/// Bounds-checked little-endian reader over one serialized item.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    family: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], family: &'static str) -> Self {
        Self { buf, pos: 0, family }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(CodecError::Truncated {
                family: self.family,
                needed: self.pos + n,
                available: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn client_id(&mut self) -> Result<ClientId, CodecError> {
        let b = self.take(ClientId::ENCODED_LEN)?;
        Ok(ClientId::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// `[len:u16][bytes]`, with `len` capped at `MESSAGE_MAX_LEN`.
    pub(crate) fn span(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u16()? as usize;
        if len > MESSAGE_MAX_LEN {
            return Err(CodecError::TooLong {
                what: "message",
                len,
                max: MESSAGE_MAX_LEN,
            });
        }
        self.take(len)
    }
}

/// Sequential writer. Callers check the total length up front.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    /// Fails unless `buf` has room for `needed` bytes.
    pub(crate) fn with_room(buf: &'a mut [u8], needed: usize) -> Result<Self, CodecError> {
        if buf.len() < needed {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    pub(crate) fn i32(&mut self, v: i32) {
        self.put(&v.to_le_bytes());
    }

    pub(crate) fn client_id(&mut self, id: ClientId) {
        self.put(&id.to_le_bytes());
    }

    pub(crate) fn span(&mut self, bytes: &[u8]) {
        // Length validated by the caller against MESSAGE_MAX_LEN.
        self.u16(bytes.len() as u16);
        self.put(bytes);
    }

    pub(crate) fn finish(self) -> usize {
        self.pos
    }
}

pub(crate) fn check_message_len(message: &[u8]) -> Result<(), CodecError> {
    if message.len() > MESSAGE_MAX_LEN {
        return Err(CodecError::TooLong {
            what: "message",
            len: message.len(),
            max: MESSAGE_MAX_LEN,
        });
    }
    Ok(())
}
