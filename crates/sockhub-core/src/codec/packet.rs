//! Socket packet framing.
//!
//! `[len:u16 LE][payload:len]`. Extraction is resumable: a view that does
//! not yet hold a whole frame yields [`Frame::Incomplete`] and the caller
//! consumes nothing.

use super::{check_message_len, Writer, MESSAGE_MAX_LEN, PACKET_HEADER_LEN};
use crate::error::CodecError;

/// Result of looking for one packet at the front of a byte view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Header or payload not fully buffered yet.
    Incomplete,
    /// One whole packet; advance the stream by `consumed`.
    Complete { payload: &'a [u8], consumed: usize },
    /// Header declares more than `MESSAGE_MAX_LEN`; no buffer will ever
    /// hold this frame.
    Oversized { declared: usize },
}

pub fn extract_packet(view: &[u8]) -> Frame<'_> {
    if view.len() < PACKET_HEADER_LEN {
        return Frame::Incomplete;
    }
    let declared = u16::from_le_bytes([view[0], view[1]]) as usize;
    if declared > MESSAGE_MAX_LEN {
        return Frame::Oversized { declared };
    }
    let consumed = PACKET_HEADER_LEN + declared;
    if view.len() < consumed {
        return Frame::Incomplete;
    }
    Frame::Complete {
        payload: &view[PACKET_HEADER_LEN..consumed],
        consumed,
    }
}

/// Header bytes for a payload of `len` bytes.
pub fn packet_header(len: usize) -> Result<[u8; PACKET_HEADER_LEN], CodecError> {
    if len > MESSAGE_MAX_LEN {
        return Err(CodecError::TooLong {
            what: "packet payload",
            len,
            max: MESSAGE_MAX_LEN,
        });
    }
    Ok((len as u16).to_le_bytes())
}

/// Serialize `payload` as one packet into `out`. Returns the bytes written.
pub fn encode_packet(payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
    check_message_len(payload)?;
    let mut w = Writer::with_room(out, PACKET_HEADER_LEN + payload.len())?;
    w.span(payload);
    Ok(w.finish())
}
