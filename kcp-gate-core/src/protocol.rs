//! KCP wire types, constants, and sequence arithmetic

use crate::buffer::ByteBuffer;
use crate::codec;
use crate::error::Violation;

/// KCP protocol constants
pub mod constants {
    pub const IKCP_RTO_NDL: u32 = 30; // no delay min rto
    pub const IKCP_RTO_MIN: u32 = 100; // normal min rto
    pub const IKCP_RTO_DEF: u32 = 200; // default rto
    pub const IKCP_RTO_MAX: u32 = 60000; // max rto
    pub const IKCP_ASK_SEND: u32 = 1; // need to send WindowAsk
    pub const IKCP_ASK_TELL: u32 = 2; // need to send WindowTell
    pub const IKCP_WND_SND: u32 = 32; // default send window
    pub const IKCP_WND_RCV: u32 = 128; // default receive window, also the minimum
    pub const IKCP_MTU_DEF: u32 = 1200; // default mtu
    pub const IKCP_MTU_MIN: u32 = 50; // smallest accepted mtu
    pub const IKCP_MTU_MAX: u32 = 65535; // largest accepted mtu
    pub const IKCP_INTERVAL: u32 = 100; // default update interval
    pub const IKCP_INTERVAL_MIN: u32 = 10;
    pub const IKCP_INTERVAL_MAX: u32 = 5000;
    pub const IKCP_OVERHEAD: u32 = 24; // kcp header overhead
    pub const IKCP_DEADLINK: u32 = 20; // max transmissions of one segment
    pub const IKCP_THRESH_INIT: u32 = 2; // initial slow start threshold
    pub const IKCP_THRESH_MIN: u32 = 2; // min slow start threshold
    pub const IKCP_PROBE_INIT: u32 = 7000; // 7 secs to probe window size
    pub const IKCP_PROBE_LIMIT: u32 = 120000; // up to 120 secs to probe window
    pub const IKCP_FASTACK_LIMIT: u32 = 5; // max times to trigger fastack
    pub const IKCP_FRG_MAX: usize = 255; // fragment index is one byte
    pub const IKCP_CLOCK_JUMP: i32 = 10000; // drift treated as a clock jump
}

/// Conversation ID type
pub type ConvId = u32;

/// Sequence number type
pub type SeqNum = u32;

/// Timestamp type (milliseconds on the caller's clock, wrapping)
pub type Timestamp = u32;

/// Generate a random non-zero conversation ID.
pub fn random_conv_id() -> ConvId {
    loop {
        let id = rand::random::<u32>();
        if id != 0 {
            return id;
        }
    }
}

/// Segment command. The byte values are fixed by the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Push = 81,
    Ack = 82,
    WindowAsk = 83,
    WindowTell = 84,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Push => "PUSH",
            Command::Ack => "ACK",
            Command::WindowAsk => "WASK",
            Command::WindowTell => "WINS",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = Violation;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            81 => Ok(Command::Push),
            82 => Ok(Command::Ack),
            83 => Ok(Command::WindowAsk),
            84 => Ok(Command::WindowTell),
            other => Err(Violation::UnknownCommand(other)),
        }
    }
}

/// Decoded 24-byte segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub conv: ConvId,
    pub cmd: Command,
    pub frg: u8,
    pub wnd: u16,
    pub ts: Timestamp,
    pub sn: SeqNum,
    pub una: SeqNum,
    pub len: u32,
}

impl SegmentHeader {
    /// Size of KCP header in bytes
    pub const SIZE: usize = 24;

    /// Decode and validate the header at the start of `buf`.
    ///
    /// The declared payload length is checked against the bytes that follow
    /// the header, so a successful decode guarantees the whole frame is
    /// present.
    pub fn decode(buf: &[u8]) -> Result<Self, Violation> {
        if buf.len() < Self::SIZE {
            return Err(Violation::TooShort(buf.len()));
        }

        let (conv, pos) = codec::decode_u32(buf, 0);
        let (cmd, pos) = codec::decode_u8(buf, pos);
        let (frg, pos) = codec::decode_u8(buf, pos);
        let (wnd, pos) = codec::decode_u16(buf, pos);
        let (ts, pos) = codec::decode_u32(buf, pos);
        let (sn, pos) = codec::decode_u32(buf, pos);
        let (una, pos) = codec::decode_u32(buf, pos);
        let (len, _) = codec::decode_u32(buf, pos);

        let remaining = buf.len() - Self::SIZE;
        if len as usize > remaining {
            return Err(Violation::Truncated {
                declared: len,
                remaining,
            });
        }

        Ok(Self {
            conv,
            cmd: Command::try_from(cmd)?,
            frg,
            wnd,
            ts,
            sn,
            una,
            len,
        })
    }

    /// Write the header at the buffer cursor.
    pub fn encode(&self, buf: &mut ByteBuffer) {
        buf.ensure_capacity(Self::SIZE);
        buf.write_u32(self.conv);
        buf.write_u8(self.cmd as u8);
        buf.write_u8(self.frg);
        buf.write_u16(self.wnd);
        buf.write_u32(self.ts);
        buf.write_u32(self.sn);
        buf.write_u32(self.una);
        buf.write_u32(self.len);
    }

    /// Total frame size, header included.
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.len as usize
    }
}

/// Statistics for one engine
#[derive(Debug, Default, Clone, Copy)]
pub struct KcpStats {
    /// Application bytes accepted by `send`
    pub bytes_sent: u64,
    /// Application bytes returned by `receive`
    pub bytes_received: u64,
    /// Datagrams emitted
    pub packets_sent: u64,
    /// Datagrams accepted by `input`
    pub packets_received: u64,
    /// Timeout retransmissions
    pub retransmissions: u64,
    /// Fast retransmissions
    pub fast_retransmissions: u64,
    /// Smoothed RTT in milliseconds
    pub rtt: u32,
    /// RTT variance
    pub rtt_var: u32,
    /// Current RTO
    pub rto: u32,
    /// Send window size
    pub snd_wnd: u32,
    /// Receive window size
    pub rcv_wnd: u32,
    /// Remote advertised window
    pub rmt_wnd: u32,
    /// Congestion window size
    pub cwnd: u32,
    /// Segments in flight
    pub snd_buf_size: u32,
    /// Out-of-order segments held for reassembly
    pub rcv_buf_size: u32,
}

/// Signed distance between two wrapping timestamps or sequence numbers.
#[inline]
pub fn time_diff(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

/// Check if a sequence number is before another (handling wrapping)
#[inline]
pub fn seq_before(seq1: SeqNum, seq2: SeqNum) -> bool {
    time_diff(seq1, seq2) < 0
}

/// Check if a sequence number is after another (handling wrapping)
#[inline]
pub fn seq_after(seq1: SeqNum, seq2: SeqNum) -> bool {
    time_diff(seq1, seq2) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(cmd: u8, len: u32, payload: usize) -> Vec<u8> {
        let mut buf = vec![0u8; SegmentHeader::SIZE + payload];
        let pos = codec::encode_u32(&mut buf, 0, 7);
        let pos = codec::encode_u8(&mut buf, pos, cmd);
        let pos = codec::encode_u8(&mut buf, pos, 1);
        let pos = codec::encode_u16(&mut buf, pos, 64);
        let pos = codec::encode_u32(&mut buf, pos, 1000);
        let pos = codec::encode_u32(&mut buf, pos, 5);
        let pos = codec::encode_u32(&mut buf, pos, 3);
        codec::encode_u32(&mut buf, pos, len);
        buf
    }

    #[test]
    fn test_header_decode() {
        let buf = raw_header(81, 4, 4);
        let header = SegmentHeader::decode(&buf).unwrap();
        assert_eq!(header.conv, 7);
        assert_eq!(header.cmd, Command::Push);
        assert_eq!(header.frg, 1);
        assert_eq!(header.wnd, 64);
        assert_eq!(header.ts, 1000);
        assert_eq!(header.sn, 5);
        assert_eq!(header.una, 3);
        assert_eq!(header.frame_len(), 28);
    }

    #[test]
    fn test_header_rejects_malformed() {
        assert_eq!(
            SegmentHeader::decode(&[0u8; 10]),
            Err(Violation::TooShort(10))
        );
        assert_eq!(
            SegmentHeader::decode(&raw_header(99, 0, 0)),
            Err(Violation::UnknownCommand(99))
        );
        assert_eq!(
            SegmentHeader::decode(&raw_header(81, 9, 4)),
            Err(Violation::Truncated {
                declared: 9,
                remaining: 4
            })
        );
    }

    #[test]
    fn test_command_bytes() {
        for cmd in [
            Command::Push,
            Command::Ack,
            Command::WindowAsk,
            Command::WindowTell,
        ] {
            assert_eq!(Command::try_from(cmd as u8), Ok(cmd));
        }
    }

    #[test]
    fn test_wrapping_comparisons() {
        assert!(seq_before(u32::MAX, 0));
        assert!(seq_after(0, u32::MAX));
        assert_eq!(time_diff(5, u32::MAX - 4), 10);
        assert!(random_conv_id() != 0);
    }
}
