//! Buffer types.
//!
//! [`Buf`] wraps `Vec<u8>` for records and datagrams and is recycled through a
//! [`BufferPool`]. [`ByteQueue`] is the FIFO byte accumulator used to
//! defragment stream input and handshake messages.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Buffer pool for reusing allocated buffers.
#[derive(Default)]
pub struct BufferPool {
    free: VecDeque<Buf>,
}

impl BufferPool {
    /// Take a Buffer from the pool.
    ///
    /// Creates a new buffer if none is free.
    pub fn pop(&mut self) -> Buf {
        self.free.pop_front().unwrap_or_default()
    }

    /// Return a buffer to the pool.
    pub fn push(&mut self, mut buffer: Buf) {
        buffer.clear();
        self.free.push_front(buffer);
    }

    /// Drop all pooled buffers.
    pub fn shrink(&mut self) {
        self.free.clear();
        self.free.shrink_to_fit();
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("free", &self.free.len())
            .finish()
    }
}

/// Growable buffer, a newtype around `Vec<u8>`.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Buf(Vec<u8>);

impl Buf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Buf(data.to_vec())
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn extend_from_slice(&mut self, other: &[u8]) {
        self.0.extend_from_slice(other);
    }

    pub fn push(&mut self, byte: u8) {
        self.0.push(byte);
    }

    pub fn resize(&mut self, len: usize, value: u8) {
        self.0.resize(len, value);
    }

    /// If `len` is greater than the buffer's current length, this has no effect.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        std::mem::take(&mut self.0)
    }

    /// Mutable access to the backing vector, for the wire writers.
    pub fn as_vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }
}

impl From<Vec<u8>> for Buf {
    fn from(value: Vec<u8>) -> Self {
        Buf(value)
    }
}

impl Deref for Buf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Buf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsRef<[u8]> for Buf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for Buf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf").field("len", &self.0.len()).finish()
    }
}

/// In-place AEAD operations append and strip the tag through this.
impl aes_gcm::aead::Buffer for Buf {
    fn extend_from_slice(&mut self, other: &[u8]) -> Result<(), aes_gcm::aead::Error> {
        self.0.extend_from_slice(other);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }
}

const MIN_QUEUE_CAPACITY: usize = 1024;

/// FIFO byte accumulator.
///
/// A growable backing array with a read cursor (`skipped`) and a fill level.
/// Consumed space at the front is reclaimed by compaction before growing.
/// Headers can be peeked before committing to consume a structure.
#[derive(Default)]
pub struct ByteQueue {
    buf: Vec<u8>,
    skipped: usize,
    available: usize,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Append bytes at the write cursor.
    pub fn add_data(&mut self, data: &[u8]) {
        let end = self.skipped + self.available;
        if end + data.len() > self.buf.len() {
            if self.available + data.len() <= self.buf.len() {
                // Enough room once the consumed prefix is reclaimed.
                self.buf.copy_within(self.skipped..end, 0);
            } else {
                let wanted = (self.available + data.len()).max(MIN_QUEUE_CAPACITY);
                let mut grown = vec![0u8; wanted.next_power_of_two()];
                grown[..self.available].copy_from_slice(&self.buf[self.skipped..end]);
                self.buf = grown;
            }
            self.skipped = 0;
        }

        let end = self.skipped + self.available;
        self.buf[end..end + data.len()].copy_from_slice(data);
        self.available += data.len();
    }

    /// The first `len` unread bytes without consuming them.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        if len > self.available {
            return None;
        }
        Some(&self.buf[self.skipped..self.skipped + len])
    }

    /// Consume up to `out.len()` bytes into `out`, returning how many were read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available);
        out[..n].copy_from_slice(&self.buf[self.skipped..self.skipped + n]);
        self.skip(n);
        n
    }

    /// Consume exactly `len` bytes, or nothing if fewer are available.
    pub fn take(&mut self, len: usize) -> Option<Vec<u8>> {
        let v = self.peek(len)?.to_vec();
        self.skip(len);
        Some(v)
    }

    /// Discard `len` bytes (clamped to what is available).
    pub fn skip(&mut self, len: usize) {
        let n = len.min(self.available);
        self.available -= n;
        self.skipped += n;
        if self.available == 0 {
            self.skipped = 0;
        }
    }

    /// Release the backing storage if the queue is empty.
    pub fn shrink(&mut self) {
        if self.available == 0 {
            self.buf = Vec::new();
            self.skipped = 0;
        }
    }
}

impl fmt::Debug for ByteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteQueue")
            .field("available", &self.available)
            .field("capacity", &self.buf.len())
            .finish()
    }
}
