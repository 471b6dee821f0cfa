//! Commands — owner → engine control messages.

use std::fmt;

use super::{check_message_len, Reader, Writer, BROADCAST_MAX_RECIPIENTS, COUNT_LEN, SPAN_LEN, TAG_LEN};
use crate::error::CodecError;
use crate::id::ClientId;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    Broadcast = 1,
    Send = 2,
    Shutdown = 3,
}

impl TryFrom<u8> for CommandTag {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Broadcast),
            2 => Ok(Self::Send),
            3 => Ok(Self::Shutdown),
            _ => Err(CodecError::UnknownTag { family: "command", tag }),
        }
    }
}

/// A command as built by the owner or decoded by the engine.
///
/// Message bytes are opaque and borrowed from the caller (encode side) or
/// from the scratch buffer the command was read into (decode side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Broadcast {
        recipients: Recipients<'a>,
        message: &'a [u8],
    },
    Send {
        client_id: ClientId,
        message: &'a [u8],
    },
    Shutdown,
}

impl<'a> Command<'a> {
    pub fn tag(&self) -> CommandTag {
        match self {
            Command::Broadcast { .. } => CommandTag::Broadcast,
            Command::Send { .. } => CommandTag::Send,
            Command::Shutdown => CommandTag::Shutdown,
        }
    }

    pub fn encoded_len(&self) -> usize {
        TAG_LEN
            + match self {
                Command::Broadcast { recipients, message } => {
                    COUNT_LEN + recipients.len() * ClientId::ENCODED_LEN + SPAN_LEN + message.len()
                }
                Command::Send { message, .. } => ClientId::ENCODED_LEN + SPAN_LEN + message.len(),
                Command::Shutdown => 0,
            }
    }

    /// Serialize into `out`, returning the bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, CodecError> {
        match self {
            Command::Broadcast { recipients, message } => {
                check_message_len(message)?;
                if recipients.len() > BROADCAST_MAX_RECIPIENTS {
                    return Err(CodecError::TooLong {
                        what: "broadcast recipient list",
                        len: recipients.len(),
                        max: BROADCAST_MAX_RECIPIENTS,
                    });
                }
            }
            Command::Send { message, .. } => check_message_len(message)?,
            Command::Shutdown => {}
        }

        let mut w = Writer::with_room(out, self.encoded_len())?;
        w.u8(self.tag() as u8);
        match self {
            Command::Broadcast { recipients, message } => {
                w.u16(recipients.len() as u16);
                for id in recipients.iter() {
                    w.client_id(id);
                }
                w.span(message);
            }
            Command::Send { client_id, message } => {
                w.client_id(*client_id);
                w.span(message);
            }
            Command::Shutdown => {}
        }
        Ok(w.finish())
    }

    /// Decode one command. The result borrows `input`.
    pub fn decode(input: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(input, "command");
        match CommandTag::try_from(r.u8()?)? {
            CommandTag::Broadcast => {
                let count = r.u16()? as usize;
                if count > BROADCAST_MAX_RECIPIENTS {
                    return Err(CodecError::TooLong {
                        what: "broadcast recipient list",
                        len: count,
                        max: BROADCAST_MAX_RECIPIENTS,
                    });
                }
                let ids = r.take(count * ClientId::ENCODED_LEN)?;
                let message = r.span()?;
                Ok(Command::Broadcast {
                    recipients: Recipients(Repr::Wire(ids)),
                    message,
                })
            }
            CommandTag::Send => {
                let client_id = r.client_id()?;
                let message = r.span()?;
                Ok(Command::Send { client_id, message })
            }
            CommandTag::Shutdown => Ok(Command::Shutdown),
        }
    }
}

/// Broadcast recipient list: either the caller's ids or their wire form.
#[derive(Clone, Copy)]
pub struct Recipients<'a>(Repr<'a>);

#[derive(Clone, Copy)]
enum Repr<'a> {
    Ids(&'a [ClientId]),
    /// Packed little-endian u32s, length a multiple of 4.
    Wire(&'a [u8]),
}

impl<'a> Recipients<'a> {
    pub fn len(&self) -> usize {
        match self.0 {
            Repr::Ids(ids) => ids.len(),
            Repr::Wire(bytes) => bytes.len() / ClientId::ENCODED_LEN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> RecipientsIter<'a> {
        RecipientsIter { repr: self.0, index: 0 }
    }
}

impl<'a> From<&'a [ClientId]> for Recipients<'a> {
    fn from(ids: &'a [ClientId]) -> Self {
        Recipients(Repr::Ids(ids))
    }
}

impl PartialEq for Recipients<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for Recipients<'_> {}

impl fmt::Debug for Recipients<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct RecipientsIter<'a> {
    repr: Repr<'a>,
    index: usize,
}

impl Iterator for RecipientsIter<'_> {
    type Item = ClientId;

    fn next(&mut self) -> Option<ClientId> {
        let id = match self.repr {
            Repr::Ids(ids) => *ids.get(self.index)?,
            Repr::Wire(bytes) => {
                let at = self.index * ClientId::ENCODED_LEN;
                let b = bytes.get(at..at + ClientId::ENCODED_LEN)?;
                ClientId::from_le_bytes([b[0], b[1], b[2], b[3]])
            }
        };
        self.index += 1;
        Some(id)
    }
}
