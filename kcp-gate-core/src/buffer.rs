//! Growable byte buffer used to assemble outbound datagrams.

use crate::codec;
use bytes::{Bytes, BytesMut};

/// Write cursor over a zero-filled region that grows in powers of two.
///
/// Frames are written with the [`codec`] functions at `position`; a finished
/// datagram is split off with [`ByteBuffer::take`] without copying.
#[derive(Debug)]
pub struct ByteBuffer {
    raw: BytesMut,
    position: usize,
}

impl ByteBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            raw: BytesMut::zeroed(capacity),
            position: 0,
        }
    }

    /// Bytes written since the last `take`.
    pub fn len(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Writable region left after the last `take`.
    pub fn capacity(&self) -> usize {
        self.raw.len()
    }

    /// Grow so that `additional` more bytes fit after the cursor.
    pub fn ensure_capacity(&mut self, additional: usize) {
        let required = self.position + additional;
        if required > self.raw.len() {
            self.raw.resize(required.next_power_of_two(), 0);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.ensure_capacity(1);
        self.position = codec::encode_u8(&mut self.raw, self.position, value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.ensure_capacity(2);
        self.position = codec::encode_u16(&mut self.raw, self.position, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.ensure_capacity(4);
        self.position = codec::encode_u32(&mut self.raw, self.position, value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.ensure_capacity(8);
        self.position = codec::encode_u64(&mut self.raw, self.position, value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.ensure_capacity(data.len());
        self.raw[self.position..self.position + data.len()].copy_from_slice(data);
        self.position += data.len();
    }

    /// Advance the cursor over `count` zero bytes (reserved header space).
    pub fn skip(&mut self, count: usize) {
        self.ensure_capacity(count);
        self.raw[self.position..self.position + count].fill(0);
        self.position += count;
    }

    /// Split off everything written so far and reset the cursor.
    pub fn take(&mut self) -> Bytes {
        let frame = self.raw.split_to(self.position).freeze();
        self.position = 0;
        frame
    }
}
