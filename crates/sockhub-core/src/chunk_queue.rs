//! Chunk queue — bounded SPSC ring of variable-length byte chunks.
//!
//! Carries serialized commands (owner → engine) and events (engine → owner).
//! Chunks are copied into one contiguous backing buffer; a separate slot
//! ring records each chunk's `(offset, len)`. A chunk never straddles the end
//! of the buffer: if it does not fit in the tail gap it is placed at offset 0
//! and the gap is skipped.
//!
//! # Thread safety
//!
//! - **Producer:** sole writer of slots and data, publishes with a Release
//!   store of `tail`.
//! - **Consumer:** sole reader, frees the oldest slot with a Release store of
//!   `head`.
//!
//! `head` and `tail` are monotonically increasing chunk counters. Actual slot
//! index = counter % slots. Empty when head == tail, full when
//! tail - head == slots (or when the bytes do not fit).
//!
//! [`ChunkProducer`] and [`ChunkConsumer`] are not `Clone`, so the
//! single-producer / single-consumer contract is carried by ownership.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::QueueError;

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    offset: usize,
    len: usize,
}

struct Shared {
    data: Box<[UnsafeCell<u8>]>,
    slots: Box<[UnsafeCell<Slot>]>,
    /// Chunks consumed. Consumer writes, producer reads.
    head: AtomicUsize,
    /// Chunks published. Producer writes, consumer reads.
    tail: AtomicUsize,
}

// Safety: slots and data bytes are only written by the producer while they
// are outside the published [head, tail) window, and only read by the
// consumer while inside it. Window edges move with Acquire/Release.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn data_ptr(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.data.as_ptr())
    }

    #[inline]
    fn slot(&self, counter: usize) -> *mut Slot {
        self.slots[counter % self.slots.len()].get()
    }

    #[inline]
    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }
}

/// Create a queue holding at most `slots` chunks and `bytes` bytes.
///
/// # Panics
///
/// If `slots` is zero.
pub fn chunk_queue(slots: usize, bytes: usize) -> (ChunkProducer, ChunkConsumer) {
    assert!(slots > 0, "chunk queue needs at least one slot");
    let shared = Arc::new(Shared {
        data: (0..bytes).map(|_| UnsafeCell::new(0)).collect(),
        slots: (0..slots).map(|_| UnsafeCell::new(Slot::default())).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        ChunkProducer {
            shared: Arc::clone(&shared),
            write_pos: 0,
        },
        ChunkConsumer { shared },
    )
}

/// Write end of a chunk queue.
pub struct ChunkProducer {
    shared: Arc<Shared>,
    /// End of the newest chunk. Producer-local.
    write_pos: usize,
}

impl ChunkProducer {
    /// Copy `chunk` into the queue.
    ///
    /// Fails with [`QueueError::Full`] when either the slot ring or the byte
    /// budget is exhausted; queued chunks are untouched.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), QueueError> {
        let shared = &*self.shared;
        let capacity = shared.data.len();
        let len = chunk.len();
        if len == 0 {
            return Err(QueueError::EmptyChunk);
        }
        if len > capacity {
            return Err(QueueError::TooLarge { len, capacity });
        }

        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= shared.slots.len() {
            return Err(QueueError::Full);
        }

        let offset = if head == tail {
            // Nothing live: restart at the front.
            0
        } else {
            // Safety: slot `head` is inside the published window; the
            // consumer never writes slots and we only rewrite slot `tail`.
            let read_pos = unsafe { (*shared.slot(head)).offset };
            self.place(read_pos, len)?
        };

        // Safety: [offset, offset + len) is outside every live chunk (see
        // `place`) and in bounds.
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), shared.data_ptr().add(offset), len);
            *shared.slot(tail) = Slot { offset, len };
        }
        self.write_pos = offset + len;
        shared.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pick an offset for `len` bytes given live data starting at `read_pos`
    /// and ending at `write_pos`.
    fn place(&self, read_pos: usize, len: usize) -> Result<usize, QueueError> {
        let capacity = self.shared.data.len();
        let w = self.write_pos;
        if w > read_pos {
            // Live: [read_pos, w). Free: [w, capacity) then [0, read_pos).
            if capacity - w >= len {
                Ok(w)
            } else if read_pos >= len {
                Ok(0)
            } else {
                Err(QueueError::Full)
            }
        } else if w < read_pos {
            // Wrapped. Live: [read_pos, end-of-chunks) and [0, w).
            if read_pos - w >= len {
                Ok(w)
            } else {
                Err(QueueError::Full)
            }
        } else {
            Err(QueueError::Full)
        }
    }

    /// Chunks currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slot_capacity(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn byte_capacity(&self) -> usize {
        self.shared.data.len()
    }
}

impl fmt::Debug for ChunkProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkProducer")
            .field("len", &self.len())
            .field("slots", &self.slot_capacity())
            .field("bytes", &self.byte_capacity())
            .finish()
    }
}

/// Read end of a chunk queue.
pub struct ChunkConsumer {
    shared: Arc<Shared>,
}

impl ChunkConsumer {
    /// Copy the oldest chunk into `scratch` and free its slot.
    ///
    /// Returns `Ok(0)` when the queue is empty; never blocks. If the chunk
    /// does not fit, it stays queued and `ScratchTooSmall` is returned.
    pub fn read_into(&mut self, scratch: &mut [u8]) -> Result<usize, QueueError> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        if head == tail {
            return Ok(0);
        }

        // Safety: slot `head` was published by the Acquire load of `tail`.
        let slot = unsafe { *shared.slot(head) };
        if slot.len > scratch.len() {
            return Err(QueueError::ScratchTooSmall {
                len: slot.len,
                scratch: scratch.len(),
            });
        }
        // Safety: the chunk's bytes are live until we advance `head`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                shared.data_ptr().add(slot.offset),
                scratch.as_mut_ptr(),
                slot.len,
            );
        }
        shared.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(slot.len)
    }

    /// Length of the oldest chunk, if any.
    pub fn peek_len(&self) -> Option<usize> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        // Safety: as in `read_into`.
        Some(unsafe { (*shared.slot(head)).len })
    }

    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ChunkConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkConsumer")
            .field("len", &self.len())
            .finish()
    }
}
