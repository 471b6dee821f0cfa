//! `ClientRegistry` — fixed-capacity set of connected clients.
//!
//! Clients live in a slot vector with a LIFO free list. Removing a client
//! empties its slot without moving any other, which is what makes cursor
//! iteration stable under [`destroy_current`](ClientRegistry::destroy_current).
//!
//! Generic over the I/O handle so the bookkeeping can be exercised without
//! sockets.

use std::collections::HashMap;

use crate::byte_ring::ByteRing;
use crate::codec::CLIENT_CAPACITY_MAX;
use crate::error::RegistryFull;
use crate::id::ClientId;

#[derive(Debug)]
pub struct Client<H> {
    id: ClientId,
    pub handle: H,
    /// Bytes read from the peer, not yet framed.
    pub inbound: ByteRing,
    /// Framed bytes waiting for the socket to accept them.
    pub outbound: ByteRing,
}

impl<H> Client<H> {
    #[inline]
    pub fn id(&self) -> ClientId {
        self.id
    }
}

/// Position of an in-progress iteration. See [`ClientRegistry::advance`].
#[derive(Debug, Default)]
pub struct Cursor {
    next: usize,
    current: Option<usize>,
}

#[derive(Debug)]
pub struct ClientRegistry<H> {
    slots: Vec<Option<Client<H>>>,
    free: Vec<usize>,
    index: HashMap<ClientId, usize>,
    next_id: u32,
    inbound_capacity: usize,
    outbound_capacity: usize,
}

impl<H> ClientRegistry<H> {
    /// # Panics
    ///
    /// If `capacity` is zero or above `CLIENT_CAPACITY_MAX`.
    pub fn new(capacity: usize, inbound_capacity: usize, outbound_capacity: usize) -> Self {
        assert!(
            (1..=CLIENT_CAPACITY_MAX).contains(&capacity),
            "registry capacity {} outside 1..={}",
            capacity,
            CLIENT_CAPACITY_MAX
        );
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
            index: HashMap::with_capacity(capacity),
            next_id: 1,
            inbound_capacity,
            outbound_capacity,
        }
    }

    /// Register a new client. Fails without side effects when full.
    pub fn create(&mut self, handle: H) -> Result<ClientId, RegistryFull> {
        let slot = self.free.pop().ok_or(RegistryFull {
            capacity: self.slots.len(),
        })?;
        let id = self.assign_id();
        self.slots[slot] = Some(Client {
            id,
            handle,
            inbound: ByteRing::with_capacity(self.inbound_capacity),
            outbound: ByteRing::with_capacity(self.outbound_capacity),
        });
        self.index.insert(id, slot);
        Ok(id)
    }

    /// Next id from the counter, skipping 0 and ids still registered.
    fn assign_id(&mut self) -> ClientId {
        loop {
            let id = ClientId::new(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if id.is_some() && !self.index.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn find(&self, id: ClientId) -> Option<&Client<H>> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_ref()
    }

    pub fn find_mut(&mut self, id: ClientId) -> Option<&mut Client<H>> {
        let slot = *self.index.get(&id)?;
        self.slots[slot].as_mut()
    }

    /// Remove a client by id, handing it back to the caller.
    pub fn destroy(&mut self, id: ClientId) -> Option<Client<H>> {
        let slot = self.index.remove(&id)?;
        self.release_slot(slot)
    }

    fn release_slot(&mut self, slot: usize) -> Option<Client<H>> {
        let client = self.slots[slot].take()?;
        self.index.remove(&client.id);
        self.free.push(slot);
        Some(client)
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::default()
    }

    /// Move the cursor to the next live client.
    pub fn advance(&mut self, cursor: &mut Cursor) -> Option<&mut Client<H>> {
        while cursor.next < self.slots.len() {
            let slot = cursor.next;
            cursor.next += 1;
            if self.slots[slot].is_some() {
                cursor.current = Some(slot);
                return self.slots[slot].as_mut();
            }
        }
        cursor.current = None;
        None
    }

    /// Remove the client the cursor is on. The next `advance` continues with
    /// the following live client.
    pub fn destroy_current(&mut self, cursor: &mut Cursor) -> Option<Client<H>> {
        let slot = cursor.current.take()?;
        self.release_slot(slot)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
