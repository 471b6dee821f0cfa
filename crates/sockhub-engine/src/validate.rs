//! Frame validation hook.
//!
//! Runs on the engine thread for every complete packet, before the Message
//! event is emitted. The scope argument is a fresh arena checkpoint the
//! validator may allocate scratch from; it is released as soon as
//! `validate` returns.

use sockhub_core::{ClientId, Scope};

/// What to do with a frame the validator refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Discard this frame, keep the client.
    Drop(&'static str),
    /// Discard this frame and disconnect the client.
    Disconnect(&'static str),
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match *self {
            Rejection::Drop(reason) | Rejection::Disconnect(reason) => reason,
        }
    }
}

pub trait FrameValidator: Send {
    fn validate(&self, client: ClientId, payload: &[u8], scratch: &Scope<'_>) -> Result<(), Rejection>;
}

/// Accepts every frame. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl FrameValidator for AcceptAll {
    #[inline]
    fn validate(&self, _: ClientId, _: &[u8], _: &Scope<'_>) -> Result<(), Rejection> {
        Ok(())
    }
}

impl<F> FrameValidator for F
where
    F: Fn(ClientId, &[u8], &Scope<'_>) -> Result<(), Rejection> + Send,
{
    fn validate(&self, client: ClientId, payload: &[u8], scratch: &Scope<'_>) -> Result<(), Rejection> {
        self(client, payload, scratch)
    }
}
