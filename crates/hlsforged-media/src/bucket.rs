//! Output buffer chain.
//!
//! Generated playlists and segments are accumulated in a sequence of
//! fixed-capacity buffers. The chain never reallocates a filled buffer; it
//! appends a new one, and refuses writes once the total would pass the
//! configured cap. A chain that has refused a write stays failed.

use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io;

/// Default capacity of a single output buffer (512 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;

/// Default cap on the total chain length (10 MiB).
pub const DEFAULT_MAX_SIZE: usize = 10 * 1024 * 1024;

/// A fixed-capacity buffer with a write cursor.
#[derive(Debug)]
pub struct OutputBuffer {
    data: BytesMut,
    capacity: usize,
}

impl OutputBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Append-only chain of output buffers.
#[derive(Debug)]
pub struct OutputChain {
    buffers: Vec<OutputBuffer>,
    buffer_size: usize,
    max_size: usize,
    len: usize,
    failed: bool,
}

impl OutputChain {
    /// Create an empty chain of `buffer_size` buffers capped at `max_size` bytes.
    pub fn new(buffer_size: usize, max_size: usize) -> Self {
        Self {
            buffers: Vec::new(),
            buffer_size: buffer_size.max(1),
            max_size,
            len: 0,
            failed: false,
        }
    }

    /// Append `data`, spilling into new buffers as the tail fills.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.failed || self.len + data.len() > self.max_size {
            self.failed = true;
            return Err(Error::BufferLimitExceeded {
                limit: self.max_size,
            });
        }

        self.len += data.len();
        while !data.is_empty() {
            if self.buffers.last().map_or(true, |b| b.remaining() == 0) {
                self.buffers.push(OutputBuffer::new(self.buffer_size));
            }
            let Some(tail) = self.buffers.last_mut() else {
                break;
            };
            let n = tail.remaining().min(data.len());
            tail.data.put_slice(&data[..n]);
            data = &data[n..];
        }
        Ok(())
    }

    /// Total bytes written.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a write has been refused.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Buffers in write order.
    pub fn buffers(&self) -> &[OutputBuffer] {
        &self.buffers
    }

    /// Buffer contents in write order.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.buffers.iter().map(|b| b.as_slice())
    }

    /// Copy the whole chain into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len);
        for chunk in self.chunks() {
            out.put_slice(chunk);
        }
        out.freeze()
    }
}

impl Default for OutputChain {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_SIZE)
    }
}

impl io::Write for OutputChain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OutputChain::write(self, buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
