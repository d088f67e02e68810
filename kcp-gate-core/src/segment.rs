//! Segments and the per-engine segment pool

use crate::buffer::ByteBuffer;
use crate::protocol::{constants, Command, ConvId, SegmentHeader, SeqNum, Timestamp};
use bytes::BytesMut;

/// One fragment of one message, plus sender-side retransmission state.
#[derive(Debug)]
pub struct Segment {
    pub conv: ConvId,
    pub cmd: Command,
    pub frg: u8,
    pub wnd: u16,
    pub ts: Timestamp,
    pub sn: SeqNum,
    pub una: SeqNum,
    pub data: BytesMut,

    // Internal fields for protocol logic
    pub resendts: Timestamp,
    pub rto: u32,
    pub fastack: u32,
    pub xmit: u32,
}

impl Default for Segment {
    fn default() -> Self {
        Self {
            conv: 0,
            cmd: Command::Push,
            frg: 0,
            wnd: 0,
            ts: 0,
            sn: 0,
            una: 0,
            data: BytesMut::new(),
            resendts: 0,
            rto: 0,
            fastack: 0,
            xmit: 0,
        }
    }
}

impl Segment {
    /// Reset every field; the payload keeps its allocation.
    pub fn reset(&mut self) {
        self.conv = 0;
        self.cmd = Command::Push;
        self.frg = 0;
        self.wnd = 0;
        self.ts = 0;
        self.sn = 0;
        self.una = 0;
        self.data.clear();
        self.resendts = 0;
        self.rto = 0;
        self.fastack = 0;
        self.xmit = 0;
    }

    /// Fill the header fields from a decoded frame header.
    pub fn apply_header(&mut self, header: &SegmentHeader) {
        self.conv = header.conv;
        self.cmd = header.cmd;
        self.frg = header.frg;
        self.wnd = header.wnd;
        self.ts = header.ts;
        self.sn = header.sn;
        self.una = header.una;
    }

    /// Header describing this segment and its payload length.
    pub fn header(&self) -> SegmentHeader {
        SegmentHeader {
            conv: self.conv,
            cmd: self.cmd,
            frg: self.frg,
            wnd: self.wnd,
            ts: self.ts,
            sn: self.sn,
            una: self.una,
            len: self.data.len() as u32,
        }
    }

    /// Encode header and payload at the buffer cursor.
    pub fn encode(&self, buf: &mut ByteBuffer) {
        buf.ensure_capacity(self.size());
        self.header().encode(buf);
        buf.write_bytes(&self.data);
    }

    /// Get total segment size
    pub fn size(&self) -> usize {
        SegmentHeader::SIZE + self.data.len()
    }
}

/// Free list of reusable segments.
///
/// `lease` hands out a segment by value and `release` takes it back by
/// value, so a segment has exactly one holder at a time and cannot be
/// returned twice.
#[derive(Debug)]
pub struct SegmentPool {
    free: Vec<Segment>,
    max_free: usize,
    allocated: u64,
}

impl SegmentPool {
    /// Default number of idle segments kept around.
    pub const DEFAULT_MAX_FREE: usize = (constants::IKCP_WND_RCV * 2) as usize;

    pub fn new(max_free: usize) -> Self {
        Self {
            free: Vec::new(),
            max_free,
            allocated: 0,
        }
    }

    /// Take a clean segment, reusing a released one if possible.
    pub fn lease(&mut self) -> Segment {
        match self.free.pop() {
            Some(seg) => seg,
            None => {
                self.allocated += 1;
                Segment::default()
            }
        }
    }

    /// Return a segment; anything beyond `max_free` is dropped.
    pub fn release(&mut self, mut seg: Segment) {
        if self.free.len() < self.max_free {
            seg.reset();
            self.free.push(seg);
        }
    }

    /// Idle segments ready for reuse.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Segments ever allocated by this pool.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_FREE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_clears_and_reuses() {
        let mut pool = SegmentPool::new(4);
        let mut seg = pool.lease();
        assert_eq!(pool.allocated(), 1);

        seg.conv = 9;
        seg.cmd = Command::Ack;
        seg.sn = 42;
        seg.xmit = 3;
        seg.data.extend_from_slice(b"payload");
        let capacity = seg.data.capacity();
        pool.release(seg);
        assert_eq!(pool.available(), 1);

        let seg = pool.lease();
        assert_eq!(pool.allocated(), 1);
        assert_eq!(seg.conv, 0);
        assert_eq!(seg.cmd, Command::Push);
        assert_eq!(seg.sn, 0);
        assert_eq!(seg.xmit, 0);
        assert!(seg.data.is_empty());
        assert_eq!(seg.data.capacity(), capacity);
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = SegmentPool::new(2);
        let segs: Vec<Segment> = (0..5).map(|_| pool.lease()).collect();
        for seg in segs {
            pool.release(seg);
        }
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.allocated(), 5);
    }

    #[test]
    fn test_encode_layout() {
        let mut seg = Segment::default();
        seg.conv = 0x01020304;
        seg.cmd = Command::WindowTell;
        seg.wnd = 128;
        seg.data.extend_from_slice(&[0xAA, 0xBB]);

        let mut buf = ByteBuffer::with_capacity(8);
        seg.encode(&mut buf);
        let frame = buf.take();

        assert_eq!(frame.len(), 26);
        assert_eq!(&frame[..4], &[4, 3, 2, 1]);
        assert_eq!(frame[4], 84);
        assert_eq!(&frame[6..8], &[128, 0]);
        assert_eq!(&frame[20..24], &[2, 0, 0, 0]);

        let header = SegmentHeader::decode(&frame).unwrap();
        assert_eq!(header.cmd, Command::WindowTell);
        assert_eq!(header.len, 2);
    }
}
