//! Synchronous KCP ARQ state machine
//!
//! The engine never touches a socket or a clock. Callers feed it inbound
//! datagrams with [`KcpEngine::input`], drive it with
//! [`KcpEngine::update`] using their own millisecond clock, and collect
//! outbound datagrams with [`KcpEngine::drain_output`].

use crate::buffer::ByteBuffer;
use crate::config::{KcpCoreConfig, NodeDelayConfig};
use crate::error::{KcpCoreError, KcpCoreResult, Violation};
use crate::protocol::*;
use crate::segment::{Segment, SegmentPool};

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// RTT calculation state
#[derive(Debug)]
struct RttState {
    srtt: u32,    // Smoothed RTT
    rttval: u32,  // RTT variance
    rto: u32,     // Retransmission timeout
    min_rto: u32, // Minimum RTO
}

/// Window control state
#[derive(Debug)]
struct WindowState {
    snd: u32,      // Send window size
    rcv: u32,      // Receive window size
    rmt: u32,      // Remote window size
    cwnd: u32,     // Congestion window
    ssthresh: u32, // Slow start threshold
    incr: u32,     // Bytes acked towards the next cwnd step
}

/// Probe state for window probing
#[derive(Debug, Default)]
struct ProbeState {
    flags: u32,
    wait: u32,
    ts: Timestamp,
}

/// Datagram assembly: frames are packed until the next one would exceed
/// the MTU, every datagram starting with `reserved` zero bytes.
#[derive(Debug)]
struct Outbox {
    buf: ByteBuffer,
    datagrams: VecDeque<Bytes>,
    mtu: usize,
    reserved: usize,
    sent: u64,
}

impl Outbox {
    fn new(mtu: usize, reserved: usize) -> Self {
        let mut buf = ByteBuffer::with_capacity(mtu);
        buf.skip(reserved);
        Self {
            buf,
            datagrams: VecDeque::new(),
            mtu,
            reserved,
            sent: 0,
        }
    }

    /// Emit the pending datagram if `space` more bytes would overflow it.
    fn make_space(&mut self, space: usize) {
        if self.buf.len() + space > self.mtu {
            self.emit();
        }
    }

    fn emit(&mut self) {
        if self.buf.len() > self.reserved {
            self.datagrams.push_back(self.buf.take());
            self.sent += 1;
            self.buf.ensure_capacity(self.mtu);
            self.buf.skip(self.reserved);
        }
    }

    fn write_header(&mut self, header: &SegmentHeader) {
        self.make_space(SegmentHeader::SIZE);
        header.encode(&mut self.buf);
    }

    fn write_segment(&mut self, seg: &Segment) {
        self.make_space(seg.size());
        seg.encode(&mut self.buf);
    }
}

/// One side of a KCP conversation.
#[derive(Debug)]
pub struct KcpEngine {
    // Core
    conv: ConvId,
    mtu: u32,
    mss: u32,
    reserved: u32,
    dead: bool,

    // Sequence numbers
    snd_una: SeqNum,
    snd_nxt: SeqNum,
    rcv_nxt: SeqNum,

    // Timing and window
    rtt: RttState,
    wnd: WindowState,
    probe: ProbeState,
    current: Timestamp,
    interval: u32,
    ts_flush: Timestamp,
    updated: bool,

    // Tuning
    nodelay: bool,
    fast_resend: u32,
    fast_limit: u32,
    no_cwnd: bool,
    dead_link: u32,

    // Buffers
    snd_queue: VecDeque<Segment>,
    rcv_queue: VecDeque<Segment>,
    snd_buf: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,
    ack_list: Vec<(SeqNum, Timestamp)>,
    pool: SegmentPool,
    outbox: Outbox,

    stats: KcpStats,
}

impl KcpEngine {
    /// Create an engine for conversation `conv`.
    pub fn new(conv: ConvId, config: KcpCoreConfig) -> KcpCoreResult<Self> {
        config.validate()?;

        let mut engine = Self {
            conv,
            mtu: config.mtu,
            mss: config.mss(),
            reserved: config.reserved,
            dead: false,

            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,

            rtt: RttState {
                srtt: 0,
                rttval: 0,
                rto: constants::IKCP_RTO_DEF,
                min_rto: constants::IKCP_RTO_MIN,
            },
            wnd: WindowState {
                snd: constants::IKCP_WND_SND,
                rcv: constants::IKCP_WND_RCV,
                rmt: constants::IKCP_WND_RCV,
                cwnd: 0,
                ssthresh: constants::IKCP_THRESH_INIT,
                incr: 0,
            },
            probe: ProbeState::default(),
            current: 0,
            interval: constants::IKCP_INTERVAL,
            ts_flush: constants::IKCP_INTERVAL,
            updated: false,

            nodelay: false,
            fast_resend: 0,
            fast_limit: config.fast_limit,
            no_cwnd: false,
            dead_link: config.dead_link,

            snd_queue: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),
            ack_list: Vec::new(),
            pool: SegmentPool::default(),
            outbox: Outbox::new(config.mtu as usize, config.reserved as usize),

            stats: KcpStats::default(),
        };

        engine.set_window_size(config.snd_wnd, config.rcv_wnd);
        engine.set_nodelay(&config.nodelay);
        Ok(engine)
    }

    pub fn conv(&self) -> ConvId {
        self.conv
    }

    /// Change the MTU; pending output is emitted first.
    pub fn set_mtu(&mut self, mtu: u32) -> KcpCoreResult<()> {
        self.reframe(mtu, self.reserved)
    }

    /// Change the number of reserved bytes at the start of each datagram.
    pub fn set_reserved(&mut self, reserved: u32) -> KcpCoreResult<()> {
        self.reframe(self.mtu, reserved)
    }

    fn reframe(&mut self, mtu: u32, reserved: u32) -> KcpCoreResult<()> {
        let config = KcpCoreConfig {
            mtu,
            reserved,
            ..KcpCoreConfig::default()
        };
        config.validate()?;

        self.outbox.emit();
        let datagrams = std::mem::take(&mut self.outbox.datagrams);
        let sent = self.outbox.sent;
        self.outbox = Outbox::new(mtu as usize, reserved as usize);
        self.outbox.datagrams = datagrams;
        self.outbox.sent = sent;

        self.mtu = mtu;
        self.reserved = reserved;
        self.mss = config.mss();
        Ok(())
    }

    /// Set send and receive windows; zero leaves a window unchanged.
    ///
    /// The receive window never drops below the default so that the
    /// largest fragmented message stays deliverable.
    pub fn set_window_size(&mut self, snd_wnd: u32, rcv_wnd: u32) {
        if snd_wnd > 0 {
            self.wnd.snd = snd_wnd;
        }
        if rcv_wnd > 0 {
            self.wnd.rcv = rcv_wnd.max(constants::IKCP_WND_RCV);
        }
    }

    pub fn set_nodelay(&mut self, config: &NodeDelayConfig) {
        self.nodelay = config.nodelay;
        self.rtt.min_rto = config.min_rto();
        self.interval = config
            .interval
            .clamp(constants::IKCP_INTERVAL_MIN, constants::IKCP_INTERVAL_MAX);
        self.fast_resend = config.resend;
        self.no_cwnd = config.no_congestion_control;
    }

    /// Flush interval in milliseconds.
    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn mss(&self) -> u32 {
        self.mss
    }

    /// Queue one message for sending, fragmenting it to fit the MSS.
    pub fn send(&mut self, data: &[u8]) -> KcpCoreResult<()> {
        if data.is_empty() {
            return Err(KcpCoreError::EmptyMessage);
        }

        let mss = self.mss as usize;
        let count = data.len().div_ceil(mss);
        if count >= self.wnd.rcv as usize || count > constants::IKCP_FRG_MAX {
            return Err(KcpCoreError::MessageTooLarge {
                fragments: count,
                window: self.wnd.rcv,
            });
        }

        for (i, chunk) in data.chunks(mss).enumerate() {
            let mut seg = self.pool.lease();
            seg.data.extend_from_slice(chunk);
            seg.frg = (count - 1 - i) as u8;
            self.snd_queue.push_back(seg);
        }

        self.stats.bytes_sent += data.len() as u64;
        trace!(conv = %self.conv, bytes = data.len(), fragments = count, "Message queued");
        Ok(())
    }

    /// Size of the next complete message, if one is ready.
    pub fn peek_size(&self) -> Option<usize> {
        let front = self.rcv_queue.front()?;
        if front.frg == 0 {
            return Some(front.data.len());
        }
        if self.rcv_queue.len() < front.frg as usize + 1 {
            return None;
        }

        let mut length = 0;
        for seg in &self.rcv_queue {
            length += seg.data.len();
            if seg.frg == 0 {
                return Some(length);
            }
        }
        // no frg == 0 in the queue: an inconsistent run is taken as one message
        debug!(
            conv = %self.conv,
            queued = self.rcv_queue.len(),
            "Fragment run has no final segment"
        );
        Some(length)
    }

    /// Copy the next complete message into `buffer` and return its length.
    pub fn receive(&mut self, buffer: &mut [u8]) -> KcpCoreResult<usize> {
        let size = self.peek_size().ok_or(KcpCoreError::NoData)?;
        if size > buffer.len() {
            return Err(KcpCoreError::BufferTooSmall {
                needed: size,
                available: buffer.len(),
            });
        }

        let recover = self.rcv_queue.len() >= self.wnd.rcv as usize;

        let mut offset = 0;
        while let Some(seg) = self.rcv_queue.pop_front() {
            let last = seg.frg == 0;
            buffer[offset..offset + seg.data.len()].copy_from_slice(&seg.data);
            offset += seg.data.len();
            self.pool.release(seg);
            if last {
                break;
            }
        }

        self.move_to_rcv_queue();

        if recover && self.rcv_queue.len() < self.wnd.rcv as usize {
            self.probe.flags |= constants::IKCP_ASK_TELL;
        }

        self.stats.bytes_received += offset as u64;
        trace!(conv = %self.conv, bytes = offset, "Message received");
        Ok(offset)
    }

    /// Receive the next complete message into a fresh buffer.
    pub fn recv(&mut self) -> Option<Bytes> {
        let size = self.peek_size()?;
        let mut buf = BytesMut::zeroed(size);
        match self.receive(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Some(buf.freeze())
            }
            Err(_) => None,
        }
    }

    /// Feed one inbound datagram (reserved prefix already stripped).
    ///
    /// Frames are applied in order; a malformed frame stops processing and
    /// is reported, while frames before it stay applied. A trailing
    /// remainder shorter than a header is ignored.
    pub fn input(&mut self, data: &[u8]) -> KcpCoreResult<()> {
        if data.len() < SegmentHeader::SIZE {
            return Err(Violation::TooShort(data.len()).into());
        }

        let prev_una = self.snd_una;
        let mut max_ack: Option<(SeqNum, Timestamp)> = None;
        let mut offset = 0;

        while data.len() - offset >= SegmentHeader::SIZE {
            let frame = &data[offset..];
            let header = SegmentHeader::decode(frame)?;
            if header.conv != self.conv {
                return Err(Violation::ConvMismatch {
                    expected: self.conv,
                    actual: header.conv,
                }
                .into());
            }
            let payload = &frame[SegmentHeader::SIZE..header.frame_len()];
            offset += header.frame_len();

            self.wnd.rmt = header.wnd as u32;
            self.parse_una(header.una);
            self.shrink_buf();

            match header.cmd {
                Command::Ack => {
                    let rtt = time_diff(self.current, header.ts);
                    if rtt >= 0 {
                        self.update_ack(rtt);
                    }
                    self.parse_ack(header.sn);
                    self.shrink_buf();

                    match max_ack {
                        Some((sn, _)) if !seq_after(header.sn, sn) => {}
                        _ => max_ack = Some((header.sn, header.ts)),
                    }
                }
                Command::Push => {
                    if seq_before(header.sn, self.rcv_nxt.wrapping_add(self.wnd.rcv)) {
                        self.ack_list.push((header.sn, header.ts));
                        if !seq_before(header.sn, self.rcv_nxt) {
                            let mut seg = self.pool.lease();
                            seg.apply_header(&header);
                            seg.data.extend_from_slice(payload);
                            self.parse_data(seg);
                        }
                    }
                }
                Command::WindowAsk => {
                    self.probe.flags |= constants::IKCP_ASK_TELL;
                }
                Command::WindowTell => {}
            }

            trace!(
                conv = %self.conv,
                cmd = header.cmd.as_str(),
                sn = header.sn,
                len = header.len,
                "Frame accepted"
            );
        }

        self.stats.packets_received += 1;

        if let Some((sn, _)) = max_ack {
            self.parse_fastack(sn);
        }

        if seq_after(self.snd_una, prev_una) && self.wnd.cwnd < self.wnd.rmt {
            self.grow_cwnd();
        }

        Ok(())
    }

    /// Drive timers. `current` is the caller's clock in milliseconds.
    pub fn update(&mut self, current: Timestamp) {
        self.current = current;

        if !self.updated {
            self.updated = true;
            self.ts_flush = current;
        }

        let mut slap = time_diff(current, self.ts_flush);
        if !(-constants::IKCP_CLOCK_JUMP..constants::IKCP_CLOCK_JUMP).contains(&slap) {
            self.ts_flush = current;
            slap = 0;
        }

        if slap >= 0 {
            self.ts_flush = self.ts_flush.wrapping_add(self.interval);
            if time_diff(current, self.ts_flush) >= 0 {
                self.ts_flush = current.wrapping_add(self.interval);
            }
            self.flush();
        }
    }

    /// When `update` must next run. Does not modify the engine.
    pub fn check(&self, current: Timestamp) -> Timestamp {
        if !self.updated {
            return current;
        }

        let mut ts_flush = self.ts_flush;
        let slap = time_diff(current, ts_flush);
        if !(-constants::IKCP_CLOCK_JUMP..constants::IKCP_CLOCK_JUMP).contains(&slap) {
            ts_flush = current;
        }
        if time_diff(current, ts_flush) >= 0 {
            return current;
        }

        let tm_flush = time_diff(ts_flush, current);
        let mut tm_packet = i32::MAX;
        for seg in &self.snd_buf {
            let diff = time_diff(seg.resendts, current);
            if diff <= 0 {
                return current;
            }
            tm_packet = tm_packet.min(diff);
        }

        let minimal = (tm_packet.min(tm_flush) as u32).min(self.interval);
        current.wrapping_add(minimal)
    }

    /// Emit acks, window probes and due data segments into the outbox.
    pub fn flush(&mut self) {
        if !self.updated {
            return;
        }

        let current = self.current;
        let wnd = self.wnd_unused();
        let mut header = SegmentHeader {
            conv: self.conv,
            cmd: Command::Ack,
            frg: 0,
            wnd,
            ts: 0,
            sn: 0,
            una: self.rcv_nxt,
            len: 0,
        };

        for (sn, ts) in self.ack_list.drain(..) {
            header.sn = sn;
            header.ts = ts;
            self.outbox.write_header(&header);
        }
        header.sn = 0;
        header.ts = 0;

        self.update_probe(current);
        if self.probe.flags & constants::IKCP_ASK_SEND != 0 {
            header.cmd = Command::WindowAsk;
            self.outbox.write_header(&header);
        }
        if self.probe.flags & constants::IKCP_ASK_TELL != 0 {
            header.cmd = Command::WindowTell;
            self.outbox.write_header(&header);
        }
        self.probe.flags = 0;

        self.move_to_snd_buf(current);

        let resent = if self.fast_resend > 0 {
            self.fast_resend
        } else {
            u32::MAX
        };
        let rtomin = if self.nodelay { 0 } else { self.rtt.rto >> 3 };
        let mut lost = false;
        let mut change = false;

        for seg in self.snd_buf.iter_mut() {
            let mut needsend = false;

            if seg.xmit == 0 {
                needsend = true;
                seg.xmit = 1;
                seg.rto = self.rtt.rto;
                seg.resendts = current.wrapping_add(seg.rto).wrapping_add(rtomin);
            } else if time_diff(current, seg.resendts) >= 0 {
                needsend = true;
                seg.xmit += 1;
                self.stats.retransmissions += 1;
                let backoff = if self.nodelay {
                    seg.rto / 2
                } else {
                    seg.rto.max(self.rtt.rto)
                };
                seg.rto = seg
                    .rto
                    .saturating_add(backoff)
                    .min(constants::IKCP_RTO_MAX);
                seg.resendts = current.wrapping_add(seg.rto);
                lost = true;
            } else if seg.fastack >= resent
                && (seg.xmit <= self.fast_limit || self.fast_limit == 0)
            {
                needsend = true;
                seg.xmit += 1;
                seg.fastack = 0;
                seg.resendts = current.wrapping_add(seg.rto);
                self.stats.fast_retransmissions += 1;
                change = true;
            }

            if needsend {
                seg.ts = current;
                seg.wnd = wnd;
                seg.una = self.rcv_nxt;
                self.outbox.write_segment(seg);

                if seg.xmit >= self.dead_link && !self.dead {
                    self.dead = true;
                    debug!(conv = %self.conv, sn = seg.sn, xmit = seg.xmit, "Dead link detected");
                }
            }
        }

        self.outbox.emit();

        if change {
            let inflight = self.snd_nxt.wrapping_sub(self.snd_una);
            self.wnd.ssthresh = (inflight / 2).max(constants::IKCP_THRESH_MIN);
            self.wnd.cwnd = self.wnd.ssthresh.saturating_add(resent);
            self.wnd.incr = self.wnd.cwnd.saturating_mul(self.mss);
        }

        if lost {
            self.wnd.ssthresh = (self.wnd.cwnd / 2).max(constants::IKCP_THRESH_MIN);
            self.reset_cwnd();
        }

        if self.wnd.cwnd < 1 {
            self.reset_cwnd();
        }
    }

    /// Take every datagram produced so far.
    pub fn drain_output(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.outbox.datagrams.drain(..)
    }

    /// Messages and fragments not yet acknowledged.
    pub fn wait_snd(&self) -> usize {
        self.snd_buf.len() + self.snd_queue.len()
    }

    /// True once a segment has been transmitted `dead_link` times.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn stats(&self) -> KcpStats {
        KcpStats {
            packets_sent: self.outbox.sent,
            rtt: self.rtt.srtt,
            rtt_var: self.rtt.rttval,
            rto: self.rtt.rto,
            snd_wnd: self.wnd.snd,
            rcv_wnd: self.wnd.rcv,
            rmt_wnd: self.wnd.rmt,
            cwnd: self.wnd.cwnd,
            snd_buf_size: self.snd_buf.len() as u32,
            rcv_buf_size: self.rcv_buf.len() as u32,
            ..self.stats
        }
    }

    // Private helper methods

    fn parse_una(&mut self, una: SeqNum) {
        while let Some(seg) = self.snd_buf.front() {
            if !seq_before(seg.sn, una) {
                break;
            }
            if let Some(seg) = self.snd_buf.pop_front() {
                self.pool.release(seg);
            }
        }
    }

    fn parse_ack(&mut self, sn: SeqNum) {
        if seq_before(sn, self.snd_una) || !seq_before(sn, self.snd_nxt) {
            return;
        }

        for i in 0..self.snd_buf.len() {
            let seg_sn = self.snd_buf[i].sn;
            if seg_sn == sn {
                if let Some(seg) = self.snd_buf.remove(i) {
                    self.pool.release(seg);
                }
                break;
            }
            if seq_before(sn, seg_sn) {
                break;
            }
        }
    }

    fn parse_fastack(&mut self, sn: SeqNum) {
        if seq_before(sn, self.snd_una) || !seq_before(sn, self.snd_nxt) {
            return;
        }

        for seg in self.snd_buf.iter_mut() {
            if seq_before(sn, seg.sn) {
                break;
            }
            if seg.sn != sn {
                seg.fastack += 1;
            }
        }
    }

    fn parse_data(&mut self, seg: Segment) {
        let sn = seg.sn;
        if !seq_before(sn, self.rcv_nxt.wrapping_add(self.wnd.rcv)) || seq_before(sn, self.rcv_nxt) {
            self.pool.release(seg);
            return;
        }

        let mut insert_at = self.rcv_buf.len();
        let mut repeat = false;
        for (i, existing) in self.rcv_buf.iter().enumerate().rev() {
            if existing.sn == sn {
                repeat = true;
                break;
            }
            if seq_before(existing.sn, sn) {
                break;
            }
            insert_at = i;
        }

        if repeat {
            self.pool.release(seg);
        } else {
            self.rcv_buf.insert(insert_at, seg);
        }

        self.move_to_rcv_queue();
    }

    fn move_to_rcv_queue(&mut self) {
        while self.rcv_queue.len() < self.wnd.rcv as usize {
            match self.rcv_buf.front() {
                Some(seg) if seg.sn == self.rcv_nxt => {}
                _ => break,
            }
            if let Some(seg) = self.rcv_buf.pop_front() {
                self.rcv_queue.push_back(seg);
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
            }
        }
    }

    fn shrink_buf(&mut self) {
        self.snd_una = match self.snd_buf.front() {
            Some(seg) => seg.sn,
            None => self.snd_nxt,
        };
    }

    fn update_ack(&mut self, rtt: i32) {
        // the sample comes from a peer-echoed timestamp
        let rtt = (rtt as u32).min(constants::IKCP_RTO_MAX);
        if self.rtt.srtt == 0 {
            self.rtt.srtt = rtt;
            self.rtt.rttval = rtt / 2;
        } else {
            let delta = rtt.abs_diff(self.rtt.srtt);
            self.rtt.rttval = (3 * self.rtt.rttval + delta) / 4;
            self.rtt.srtt = ((7 * self.rtt.srtt + rtt) / 8).max(1);
        }

        let rto = self
            .rtt
            .srtt
            .saturating_add(self.interval.max(self.rtt.rttval.saturating_mul(4)));
        self.rtt.rto = rto.clamp(self.rtt.min_rto, constants::IKCP_RTO_MAX);
    }

    fn grow_cwnd(&mut self) {
        let mss = self.mss;
        if self.wnd.cwnd < self.wnd.ssthresh {
            self.wnd.cwnd += 1;
            self.wnd.incr = self.wnd.incr.saturating_add(mss);
        } else {
            if self.wnd.incr < mss {
                self.wnd.incr = mss;
            }
            self.wnd.incr = self
                .wnd
                .incr
                .saturating_add((mss * mss) / self.wnd.incr + mss / 16);
            if (self.wnd.cwnd + 1).saturating_mul(mss) <= self.wnd.incr {
                self.wnd.cwnd = self.wnd.incr.div_ceil(mss);
            }
        }
        if self.wnd.cwnd > self.wnd.rmt {
            self.wnd.cwnd = self.wnd.rmt;
            self.wnd.incr = self.wnd.rmt.saturating_mul(mss);
        }
    }

    fn update_probe(&mut self, current: Timestamp) {
        if self.wnd.rmt != 0 {
            self.probe.ts = 0;
            self.probe.wait = 0;
            return;
        }

        if self.probe.wait == 0 {
            self.probe.wait = constants::IKCP_PROBE_INIT;
            self.probe.ts = current.wrapping_add(self.probe.wait);
        } else if time_diff(current, self.probe.ts) >= 0 {
            self.probe.wait = self.probe.wait.max(constants::IKCP_PROBE_INIT);
            self.probe.wait += self.probe.wait / 2;
            self.probe.wait = self.probe.wait.min(constants::IKCP_PROBE_LIMIT);
            self.probe.ts = current.wrapping_add(self.probe.wait);
            self.probe.flags |= constants::IKCP_ASK_SEND;
        }
    }

    fn move_to_snd_buf(&mut self, current: Timestamp) {
        let mut cwnd = self.wnd.snd.min(self.wnd.rmt);
        if !self.no_cwnd {
            cwnd = cwnd.min(self.wnd.cwnd);
        }

        while seq_before(self.snd_nxt, self.snd_una.wrapping_add(cwnd)) {
            let Some(mut seg) = self.snd_queue.pop_front() else {
                break;
            };
            seg.conv = self.conv;
            seg.cmd = Command::Push;
            seg.wnd = self.wnd_unused();
            seg.ts = current;
            seg.sn = self.snd_nxt;
            seg.una = self.rcv_nxt;
            seg.resendts = current;
            seg.rto = self.rtt.rto;
            seg.fastack = 0;
            seg.xmit = 0;

            self.snd_buf.push_back(seg);
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
        }
    }

    /// Free receive slots as advertised in the 16-bit `wnd` field.
    fn wnd_unused(&self) -> u16 {
        let free = self.wnd.rcv.saturating_sub(self.rcv_queue.len() as u32);
        free.min(u16::MAX as u32) as u16
    }

    /// Reset congestion window to initial state
    #[inline]
    fn reset_cwnd(&mut self) {
        self.wnd.cwnd = 1;
        self.wnd.incr = self.mss;
    }
}
