//! `Arena` — linear allocator with checkpoint/release scoping.
//!
//! All transient serialization (commands, events, validator scratch) is
//! carved out of one contiguous region with a bump cursor. A checkpoint is
//! a [`Scope`] guard: it records the cursor when created and rewinds to it
//! when dropped, releasing everything allocated through it at once.
//!
//! # Lifetime discipline
//!
//! Buffers returned by [`Scope::alloc`] borrow the scope, so the compiler
//! rejects any use after the scope is released:
//!
//! ```compile_fail
//! use sockhub_core::arena::Arena;
//!
//! let mut arena = Arena::new(64);
//! let leaked = {
//!     let scope = arena.checkpoint();
//!     scope.alloc(8).unwrap()
//! };
//! leaked[0] = 1;
//! ```
//!
//! Nested scopes borrow their parent, so a child never outlives it.
//! Borrowing cannot stop a parent from allocating, or from opening a
//! second child, while a child is alive. Both would let an out-of-order
//! release rewind over live memory, so both fail at runtime with
//! [`ArenaError::ScopeShadowed`]. Only the innermost live scope may
//! allocate or open a child.
//!
//! Single-threaded: `Arena` is `!Sync`.

use std::cell::{Cell, UnsafeCell};
use std::fmt;

use crate::error::ArenaError;

pub struct Arena {
    mem: Box<[UnsafeCell<u8>]>,
    cursor: Cell<usize>,
    /// Depth of the innermost live scope (0 = none).
    depth: Cell<usize>,
}

impl Arena {
    /// Create an arena backed by `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        Self {
            mem: (0..size).map(|_| UnsafeCell::new(0)).collect(),
            cursor: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    /// Open the outermost scope. The arena is exclusively borrowed until
    /// the scope is dropped.
    pub fn checkpoint(&mut self) -> Scope<'_> {
        Scope::open(self)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.cursor.get()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.mem.len() - self.cursor.get()
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// A checkpoint. Dropping it releases every allocation made through it.
pub struct Scope<'a> {
    arena: &'a Arena,
    mark: usize,
    depth: usize,
}

impl<'a> Scope<'a> {
    fn open(arena: &'a Arena) -> Self {
        let depth = arena.depth.get() + 1;
        arena.depth.set(depth);
        Self {
            arena,
            mark: arena.cursor.get(),
            depth,
        }
    }

    /// Open a nested checkpoint. Allocations already made through `self`
    /// stay valid; everything allocated through the child is released when
    /// the child drops.
    ///
    /// Fails with `ScopeShadowed` if `self` already has a live child.
    pub fn checkpoint(&self) -> Result<Scope<'_>, ArenaError> {
        self.ensure_innermost()?;
        Ok(Scope::open(self.arena))
    }

    fn ensure_innermost(&self) -> Result<(), ArenaError> {
        let active = self.arena.depth.get();
        if active != self.depth {
            return Err(ArenaError::ScopeShadowed {
                scope: self.depth,
                active,
            });
        }
        Ok(())
    }

    /// Allocate `size` zeroed bytes. Never partially succeeds.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc(&self, size: usize) -> Result<&mut [u8], ArenaError> {
        self.ensure_innermost()?;
        let start = self.arena.cursor.get();
        let remaining = self.arena.mem.len() - start;
        if size > remaining {
            return Err(ArenaError::OutOfMemory {
                requested: size,
                remaining,
            });
        }
        self.arena.cursor.set(start + size);

        // Safety: [start, start + size) lies inside `mem` and was just taken
        // off the cursor, so no other live slice overlaps it. Memory is only
        // handed out again after this scope (and with it the returned
        // borrow) is gone.
        unsafe {
            let base = UnsafeCell::raw_get(self.arena.mem.as_ptr());
            let ptr = base.add(start);
            std::ptr::write_bytes(ptr, 0, size);
            Ok(std::slice::from_raw_parts_mut(ptr, size))
        }
    }

    /// Bytes still available to this scope.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.arena.remaining()
    }

    /// Bytes allocated through this scope and its live children.
    #[inline]
    pub fn used(&self) -> usize {
        self.arena.cursor.get() - self.mark
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.arena.cursor.set(self.mark);
        self.arena.depth.set(self.depth - 1);
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("mark", &self.mark)
            .field("depth", &self.depth)
            .finish()
    }
}
