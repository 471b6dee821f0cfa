//! `ByteRing` — circular byte buffer for one client stream.
//!
//! Grows only through [`write`](ByteRing::write) and shrinks only through
//! [`advance`](ByteRing::advance). Frame extraction peeks a contiguous copy,
//! decides how much is a complete frame, then advances exactly that far so a
//! trailing partial frame stays buffered for the next read.

use crate::error::BufferFull;

#[derive(Debug)]
pub struct ByteRing {
    buf: Box<[u8]>,
    /// Index of the oldest buffered byte.
    head: usize,
    len: usize,
}

impl ByteRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Append all of `bytes`, or nothing.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        if bytes.len() > self.free() {
            return Err(BufferFull {
                requested: bytes.len(),
                free: self.free(),
            });
        }
        let cap = self.buf.len();
        if cap == 0 {
            return Ok(());
        }
        let tail = (self.head + self.len) % cap;
        let first = bytes.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&bytes[..first]);
        self.buf[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
        Ok(())
    }

    /// Copy up to `dst.len()` of the oldest bytes into `dst` without
    /// consuming them. Returns how many were copied.
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        let (a, b) = self.as_slices();
        let n = dst.len().min(self.len);
        let first = n.min(a.len());
        dst[..first].copy_from_slice(&a[..first]);
        dst[first..n].copy_from_slice(&b[..n - first]);
        n
    }

    /// Discard the oldest `n` bytes.
    ///
    /// # Panics
    ///
    /// If `n` exceeds the buffered length; advancing past unread data is a
    /// framing bug.
    pub fn advance(&mut self, n: usize) {
        assert!(n <= self.len, "advance({}) past {} buffered bytes", n, self.len);
        if n == self.len {
            self.head = 0;
            self.len = 0;
            return;
        }
        self.head = (self.head + n) % self.buf.len();
        self.len -= n;
    }

    /// Buffered bytes in order, as at most two contiguous runs.
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let cap = self.buf.len();
        if self.len == 0 {
            return (&[], &[]);
        }
        let end = self.head + self.len;
        if end <= cap {
            (&self.buf[self.head..end], &[])
        } else {
            (&self.buf[self.head..], &self.buf[..end - cap])
        }
    }
}
