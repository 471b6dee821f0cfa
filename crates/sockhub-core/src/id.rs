//! Client identifier type

use core::fmt;

/// Identifier of a connected client.
///
/// Assigned by the client registry on accept. Unique among registered
/// clients; the value `0` is reserved as the "no client" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Sentinel value indicating no client
    pub const NONE: ClientId = ClientId(0);

    /// Serialized width on the command/event channels.
    pub const ENCODED_LEN: usize = 4;

    /// Create a new ClientId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        ClientId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Check if this is a real client ID
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Little-endian wire bytes.
    #[inline]
    pub const fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        ClientId(u32::from_le_bytes(bytes))
    }
}

impl From<u32> for ClientId {
    #[inline]
    fn from(id: u32) -> Self {
        ClientId(id)
    }
}

impl From<ClientId> for u32 {
    #[inline]
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ClientId(NONE)")
        } else {
            write!(f, "ClientId({})", self.0)
        }
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for ClientId {
    fn default() -> Self {
        ClientId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_basics() {
        let id = ClientId::new(42);
        assert_eq!(id.as_u32(), 42);
        assert!(!id.is_none());
        assert!(id.is_some());
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_client_id_none() {
        let none = ClientId::default();
        assert!(none.is_none());
        assert_eq!(format!("{:?}", none), "ClientId(NONE)");
    }

    #[test]
    fn test_client_id_wire_bytes() {
        let id = ClientId::new(0x0403_0201);
        assert_eq!(id.to_le_bytes(), [1, 2, 3, 4]);
        assert_eq!(ClientId::from_le_bytes([1, 2, 3, 4]), id);
    }
}
