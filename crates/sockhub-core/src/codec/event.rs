//! Events — engine → owner notifications.

use super::{check_message_len, Reader, Writer, SPAN_LEN, TAG_LEN};
use crate::error::CodecError;
use crate::id::ClientId;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag {
    Connect = 1,
    Disconnect = 2,
    Message = 3,
    Error = 4,
}

impl TryFrom<u8> for EventTag {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, CodecError> {
        match tag {
            1 => Ok(EventTag::Connect),
            2 => Ok(EventTag::Disconnect),
            3 => Ok(EventTag::Message),
            4 => Ok(EventTag::Error),
            _ => Err(CodecError::UnknownTag { family: "event", tag }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    Connect { client_id: ClientId },
    Disconnect { client_id: ClientId },
    Message { client_id: ClientId, payload: &'a [u8] },
    /// A socket operation on this client failed. The client is torn down and
    /// a `Disconnect` follows.
    Error { client_id: ClientId, errno: i32 },
}

impl<'a> Event<'a> {
    pub fn tag(&self) -> EventTag {
        match self {
            Event::Connect { .. } => EventTag::Connect,
            Event::Disconnect { .. } => EventTag::Disconnect,
            Event::Message { .. } => EventTag::Message,
            Event::Error { .. } => EventTag::Error,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match *self {
            Event::Connect { client_id }
            | Event::Disconnect { client_id }
            | Event::Message { client_id, .. }
            | Event::Error { client_id, .. } => client_id,
        }
    }

    pub fn encoded_len(&self) -> usize {
        TAG_LEN
            + ClientId::ENCODED_LEN
            + match self {
                Event::Connect { .. } | Event::Disconnect { .. } => 0,
                Event::Message { payload, .. } => SPAN_LEN + payload.len(),
                Event::Error { .. } => 4,
            }
    }

    /// Serialize into `out`, returning the bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, CodecError> {
        if let Event::Message { payload, .. } = self {
            check_message_len(payload)?;
        }
        let mut w = Writer::with_room(out, self.encoded_len())?;
        w.u8(self.tag() as u8);
        w.client_id(self.client_id());
        match self {
            Event::Connect { .. } | Event::Disconnect { .. } => {}
            Event::Message { payload, .. } => w.span(payload),
            Event::Error { errno, .. } => w.i32(*errno),
        }
        Ok(w.finish())
    }

    /// Decode one event. The result borrows `input`.
    pub fn decode(input: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(input, "event");
        let tag = EventTag::try_from(r.u8()?)?;
        let client_id = r.client_id()?;
        Ok(match tag {
            EventTag::Connect => Event::Connect { client_id },
            EventTag::Disconnect => Event::Disconnect { client_id },
            EventTag::Message => Event::Message {
                client_id,
                payload: r.span()?,
            },
            EventTag::Error => Event::Error {
                client_id,
                errno: r.i32()?,
            },
        })
    }

    /// Copy the payload out so the event can outlive the buffer it was
    /// decoded from.
    pub fn into_owned(self) -> OwnedEvent {
        match self {
            Event::Connect { client_id } => OwnedEvent::Connect { client_id },
            Event::Disconnect { client_id } => OwnedEvent::Disconnect { client_id },
            Event::Message { client_id, payload } => OwnedEvent::Message {
                client_id,
                payload: payload.to_vec(),
            },
            Event::Error { client_id, errno } => OwnedEvent::Error { client_id, errno },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedEvent {
    Connect { client_id: ClientId },
    Disconnect { client_id: ClientId },
    Message { client_id: ClientId, payload: Vec<u8> },
    Error { client_id: ClientId, errno: i32 },
}

impl OwnedEvent {
    pub fn client_id(&self) -> ClientId {
        match *self {
            OwnedEvent::Connect { client_id }
            | OwnedEvent::Disconnect { client_id }
            | OwnedEvent::Message { client_id, .. }
            | OwnedEvent::Error { client_id, .. } => client_id,
        }
    }
}
