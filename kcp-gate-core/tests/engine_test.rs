//! Core-only integration tests, no tokio dependency

use bytes::Bytes;
use kcp_gate_core::{
    constants, ByteBuffer, Command, KcpCoreConfig, KcpCoreError, KcpEngine, NodeDelayConfig,
    SegmentHeader, Violation,
};

/// Send all output packets from one engine into another engine's input.
fn transfer(src: &mut KcpEngine, dst: &mut KcpEngine) -> Vec<Bytes> {
    let packets: Vec<Bytes> = src.drain_output().collect();
    for packet in &packets {
        let _ = dst.input(packet);
    }
    packets
}

/// Headers of every frame in a datagram.
fn frames(datagram: &[u8]) -> Vec<SegmentHeader> {
    let mut headers = Vec::new();
    let mut offset = 0;
    while datagram.len() - offset >= SegmentHeader::SIZE {
        let header = SegmentHeader::decode(&datagram[offset..]).unwrap();
        offset += header.frame_len();
        headers.push(header);
    }
    headers
}

/// A lone ack frame echoing `ts`, as a peer would send it.
fn ack_datagram(conv: u32, sn: u32, ts: u32) -> Bytes {
    let header = SegmentHeader {
        conv,
        cmd: Command::Ack,
        frg: 0,
        wnd: 128,
        ts,
        sn,
        una: 0,
        len: 0,
    };
    let mut buf = ByteBuffer::with_capacity(SegmentHeader::SIZE);
    header.encode(&mut buf);
    buf.take()
}

fn engine(conv: u32, config: KcpCoreConfig) -> KcpEngine {
    let mut kcp = KcpEngine::new(conv, config).unwrap();
    kcp.update(0);
    kcp
}

fn fast_config() -> KcpCoreConfig {
    KcpCoreConfig {
        nodelay: NodeDelayConfig::fast(),
        ..Default::default()
    }
}

/// One round: both sides update at `now` and exchange their output.
/// Returns the datagrams the sender emitted.
fn round(tx: &mut KcpEngine, rx: &mut KcpEngine, now: u32) -> Vec<Bytes> {
    tx.update(now);
    let sent = transfer(tx, rx);
    rx.update(now);
    transfer(rx, tx);
    sent
}

#[test]
fn test_basic_send_recv() {
    let mut client = engine(1, KcpCoreConfig::default());
    let mut server = engine(1, KcpCoreConfig::default());

    client.send(b"hello").unwrap();
    let mut now = 0;
    while server.peek_size().is_none() {
        now += client.interval();
        round(&mut client, &mut server, now);
    }

    assert_eq!(server.recv().unwrap(), Bytes::from("hello"));
    assert_eq!(client.wait_snd(), 0);

    let stats = client.stats();
    assert_eq!(stats.bytes_sent, 5);
    assert!(stats.packets_sent > 0);

    let stats = server.stats();
    assert_eq!(stats.bytes_received, 5);
    assert!(stats.packets_received > 0);
}

#[test]
fn test_large_message_reassembles() {
    let mut client = engine(3, KcpCoreConfig::default());
    let mut server = engine(3, KcpCoreConfig::default());

    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    client.send(&data).unwrap();

    let mut now = 0;
    for _ in 0..100 {
        now += client.interval();
        round(&mut client, &mut server, now);
        if client.wait_snd() == 0 {
            break;
        }
    }

    assert_eq!(server.peek_size(), Some(10_000));
    let mut buf = vec![0u8; 10_000];
    assert_eq!(server.receive(&mut buf).unwrap(), 10_000);
    assert_eq!(buf, data);
}

#[test]
fn test_fragments_of_3000_bytes_at_default_mtu() {
    let mut client = engine(4, KcpCoreConfig::default());
    let mut server = engine(4, KcpCoreConfig::default());

    client.send(&[0x5Au8; 3000]).unwrap();
    assert_eq!(client.wait_snd(), 3);

    let mut pushes = Vec::new();
    let mut now = 0;
    for _ in 0..50 {
        now += client.interval();
        for datagram in round(&mut client, &mut server, now) {
            assert!(datagram.len() <= 1200);
            pushes.extend(frames(&datagram).into_iter().filter(|h| h.cmd == Command::Push));
        }
        if client.wait_snd() == 0 {
            break;
        }
    }

    assert_eq!(client.wait_snd(), 0);
    let frgs: Vec<u8> = pushes.iter().map(|h| h.frg).collect();
    assert_eq!(frgs, vec![2, 1, 0]);
    assert!(pushes.iter().all(|h| h.len <= 1176));
    assert_eq!(server.recv().unwrap().len(), 3000);
}

#[test]
fn test_reverse_order_delivery() {
    let mut client = engine(5, fast_config());
    let mut server = engine(5, fast_config());

    let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
    client.send(&data).unwrap();
    client.update(client.interval());

    let mut datagrams: Vec<Bytes> = client.drain_output().collect();
    assert_eq!(datagrams.len(), 3);
    datagrams.reverse();

    for (i, datagram) in datagrams.iter().enumerate() {
        server.input(datagram).unwrap();
        if i < 2 {
            assert_eq!(server.peek_size(), None);
        }
    }
    assert_eq!(server.recv().unwrap(), Bytes::from(data));
}

#[test]
fn test_duplicates_are_dropped() {
    let mut client = engine(6, fast_config());
    let mut server = engine(6, fast_config());

    client.send(&[1u8; 2000]).unwrap();
    client.update(client.interval());
    let datagrams: Vec<Bytes> = client.drain_output().collect();
    assert_eq!(datagrams.len(), 2);

    // second fragment twice before the first: held once in rcv_buf
    server.input(&datagrams[1]).unwrap();
    server.input(&datagrams[1]).unwrap();
    assert_eq!(server.stats().rcv_buf_size, 1);

    server.input(&datagrams[0]).unwrap();
    server.input(&datagrams[0]).unwrap();
    assert_eq!(server.stats().rcv_buf_size, 0);

    assert_eq!(server.recv().unwrap().len(), 2000);
    assert!(server.recv().is_none());

    // replaying after delivery changes nothing
    server.input(&datagrams[0]).unwrap();
    server.input(&datagrams[1]).unwrap();
    assert!(server.recv().is_none());
}

#[test]
fn test_wait_snd_decreases_monotonically() {
    let mut client = engine(7, KcpCoreConfig::default());
    let mut server = engine(7, KcpCoreConfig::default());

    for i in 0..20u8 {
        client.send(&vec![i; 500 + i as usize * 100]).unwrap();
    }

    let mut last = client.wait_snd();
    let mut now = 0;
    for _ in 0..500 {
        now += client.interval();
        round(&mut client, &mut server, now);
        let waiting = client.wait_snd();
        assert!(waiting <= last, "wait_snd grew from {} to {}", last, waiting);
        last = waiting;
        if waiting == 0 {
            break;
        }
    }
    assert_eq!(last, 0);

    for i in 0..20u8 {
        let msg = server.recv().unwrap();
        assert_eq!(msg.len(), 500 + i as usize * 100);
        assert!(msg.iter().all(|&b| b == i));
    }
}

#[test]
fn test_fragment_count_limited_by_receive_window() {
    let mut client = engine(8, KcpCoreConfig::default());
    let mss = client.mss() as usize;

    let err = client.send(&vec![0u8; mss * 128]).unwrap_err();
    assert!(err.is_capacity());
    assert!(matches!(err, KcpCoreError::MessageTooLarge { .. }));

    assert!(client.send(&vec![0u8; mss * 127]).is_ok());
}

#[test]
fn test_conv_mismatch() {
    let mut client = engine(100, fast_config());
    let mut server = engine(999, fast_config());

    client.send(b"mismatch").unwrap();
    client.update(client.interval());
    let datagram = client.drain_output().next().unwrap();

    let err = server.input(&datagram).unwrap_err();
    assert!(matches!(
        err,
        KcpCoreError::Protocol(Violation::ConvMismatch {
            expected: 999,
            actual: 100
        })
    ));
    assert!(server.recv().is_none());
}

#[test]
fn test_malformed_frame_keeps_earlier_frames() {
    let mut client = engine(9, fast_config());
    let mut server = engine(9, fast_config());

    client.send(b"first").unwrap();
    client.update(client.interval());
    let good = client.drain_output().next().unwrap();

    let mut bad_frame = good[..SegmentHeader::SIZE].to_vec();
    bad_frame[4] = 99;
    bad_frame[20..24].copy_from_slice(&[0, 0, 0, 0]);

    let mut datagram = good.to_vec();
    datagram.extend_from_slice(&bad_frame);
    let err = server.input(&datagram).unwrap_err();
    assert!(matches!(
        err,
        KcpCoreError::Protocol(Violation::UnknownCommand(99))
    ));
    assert_eq!(server.recv().unwrap(), Bytes::from("first"));
}

#[test]
fn test_truncated_and_short_input() {
    let mut client = engine(10, fast_config());
    let mut server = engine(10, fast_config());

    assert!(matches!(
        server.input(&[0u8; 10]),
        Err(KcpCoreError::Protocol(Violation::TooShort(10)))
    ));

    client.send(b"payload").unwrap();
    client.update(client.interval());
    let good = client.drain_output().next().unwrap();

    let err = server.input(&good[..good.len() - 1]).unwrap_err();
    assert!(matches!(
        err,
        KcpCoreError::Protocol(Violation::Truncated {
            declared: 7,
            remaining: 6
        })
    ));

    // a tail shorter than a header is ignored
    let mut datagram = good.to_vec();
    datagram.extend_from_slice(&[0u8; 10]);
    server.input(&datagram).unwrap();
    assert_eq!(server.recv().unwrap(), Bytes::from("payload"));
}

#[test]
fn test_timeout_retransmission_and_dead_link() {
    let config = KcpCoreConfig {
        dead_link: 3,
        ..Default::default()
    };
    let mut client = engine(11, config);
    client.send(b"into the void").unwrap();

    let mut now = 0;
    while !client.is_dead() && now < 10_000 {
        now += client.interval();
        client.update(now);
        client.drain_output().for_each(drop);
    }

    assert!(client.is_dead());
    assert_eq!(client.stats().retransmissions, 2);
    assert_eq!(client.stats().cwnd, 1);
}

#[test]
fn test_fast_retransmit() {
    let mut client = engine(12, fast_config());
    let mut server = engine(12, fast_config());

    for i in 0..4u8 {
        client.send(&[i; 16]).unwrap();
    }
    let now = client.interval();
    client.update(now);
    let datagrams: Vec<Bytes> = client.drain_output().collect();
    // small frames share one datagram; split them so one can be lost
    let segments: Vec<SegmentHeader> = datagrams.iter().flat_map(|d| frames(d)).collect();
    assert_eq!(segments.len(), 4);

    let mut split = Vec::new();
    for datagram in &datagrams {
        let mut offset = 0;
        for header in frames(datagram) {
            split.push(datagram.slice(offset..offset + header.frame_len()));
            offset += header.frame_len();
        }
    }

    // lose sn 0, deliver 1 and 2 with a separate ack exchange each
    for frame in &split[1..3] {
        server.input(frame).unwrap();
        server.flush();
        transfer(&mut server, &mut client);
    }

    client.flush();
    let resent: Vec<SegmentHeader> = client.drain_output().flat_map(|d| frames(&d)).collect();
    assert!(resent.iter().any(|h| h.cmd == Command::Push && h.sn == 0));
    assert_eq!(client.stats().fast_retransmissions, 1);
    assert_eq!(client.stats().retransmissions, 0);
}

#[test]
fn test_update_and_check_schedule() {
    let mut client = engine(13, KcpCoreConfig::default());
    let interval = client.interval();

    let next = client.check(0);
    assert!(next > 0 && next <= interval);

    client.send(b"tick").unwrap();
    client.update(interval);
    assert_eq!(client.drain_output().count(), 1);

    // a jump of more than 10 s resets the baseline and flushes once
    client.update(100_000);
    assert_eq!(client.drain_output().count(), 1);
    let next = client.check(100_000);
    assert!(next > 100_000 && next <= 100_000 + interval);

    // calling again before the next deadline does not flush
    client.update(100_001);
    assert_eq!(client.drain_output().count(), 0);

    // jumping backwards also resets instead of stalling
    client.update(80_000);
    assert_eq!(client.check(80_000), 80_000 + interval);
}

#[test]
fn test_zero_window_probe() {
    let config = KcpCoreConfig {
        snd_wnd: 256,
        ..fast_config()
    };
    let mut client = engine(14, config);
    let mut server = engine(14, fast_config());

    for i in 0..200u32 {
        client.send(&i.to_le_bytes()).unwrap();
    }

    let mut asked = false;
    let mut now = 0;
    while now < 8_000 {
        now += client.interval();
        for datagram in round(&mut client, &mut server, now) {
            asked |= frames(&datagram).iter().any(|h| h.cmd == Command::WindowAsk);
        }
    }
    assert!(asked);
    assert_eq!(client.stats().rmt_wnd, 0);
    assert!(client.wait_snd() > 0);

    let mut received = Vec::new();
    for _ in 0..1000 {
        while let Some(msg) = server.recv() {
            received.push(u32::from_le_bytes([msg[0], msg[1], msg[2], msg[3]]));
        }
        if received.len() == 200 {
            break;
        }
        now += client.interval();
        round(&mut client, &mut server, now);
    }

    assert_eq!(received, (0..200).collect::<Vec<u32>>());
}

#[test]
fn test_huge_rtt_sample_from_peer_is_bounded() {
    let mut client = engine(20, KcpCoreConfig::default());
    client.update(1_000_000_000);

    // echoed timestamps far in the past give samples of hundreds of millions of ms
    client.input(&ack_datagram(20, 0, 300_000_000)).unwrap();
    client.input(&ack_datagram(20, 0, 1_000_000_000)).unwrap();
    client.input(&ack_datagram(20, 0, 1)).unwrap();

    let stats = client.stats();
    assert!(stats.rtt <= constants::IKCP_RTO_MAX);
    assert!(stats.rtt_var <= constants::IKCP_RTO_MAX);
    assert_eq!(stats.rto, constants::IKCP_RTO_MAX);
}

#[test]
fn test_receive_window_above_wire_range_saturates() {
    let mut client = engine(21, fast_config());
    let mut server = engine(
        21,
        KcpCoreConfig {
            rcv_wnd: 65536,
            ..fast_config()
        },
    );

    client.send(b"one").unwrap();
    client.send(b"two").unwrap();
    let mut received = Vec::new();
    let mut now = 0;
    for _ in 0..50 {
        now += client.interval();
        round(&mut client, &mut server, now);
        while let Some(msg) = server.recv() {
            received.push(msg);
        }
    }

    assert_eq!(received, vec![Bytes::from("one"), Bytes::from("two")]);
    assert_eq!(client.stats().rmt_wnd, u16::MAX as u32);
    assert_eq!(client.wait_snd(), 0);
}

#[test]
fn test_backoff_survives_long_clock_steps() {
    let config = KcpCoreConfig {
        dead_link: 1000,
        ..Default::default()
    };
    let mut client = engine(22, config);
    client.send(b"nobody home").unwrap();

    let mut now: u32 = 0;
    for _ in 0..40 {
        now = now.wrapping_add(i32::MAX as u32);
        client.update(now);
        assert!(client.drain_output().count() >= 1);
    }

    assert_eq!(client.stats().retransmissions, 39);
    assert!(client.stats().rto <= constants::IKCP_RTO_MAX);
    assert!(!client.is_dead());
}
