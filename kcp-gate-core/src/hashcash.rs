//! HashCash proof-of-work admission tokens
//!
//! A token binds an issue time, a resource and a random salt; the miner
//! increments `counter` until the SHA-256 digest of the 28-byte encoding
//! starts with the requested number of zero bits. Verification is a single
//! hash, so the listener can afford to check every first datagram.

use crate::codec;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 100 ns ticks between 0001-01-01 and 1970-01-01.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// How old a token may be.
pub const MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// How far a token may be issued in the future (clock skew allowance).
pub const MAX_SKEW: Duration = Duration::from_secs(5 * 60);

/// Largest meaningful difficulty: every bit of the digest.
pub const MAX_DIFFICULTY: u32 = 256;

/// A mined or received admission token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashCash {
    /// Issue time in 100 ns ticks since 0001-01-01 UTC
    pub issued_at: i64,
    /// Stable hash of the resource name
    pub resource: i32,
    pub salt: u64,
    pub counter: u64,
}

impl HashCash {
    /// Encoded size in bytes
    pub const SIZE: usize = 28;

    /// Mine a token for `resource` issued now with a random salt.
    ///
    /// CPU-bound: roughly `2^difficulty_bits` hashes on average.
    pub fn mine(resource: &str, difficulty_bits: u32) -> Self {
        Self::mine_with(resource, difficulty_bits, ticks_now(), rand::random())
    }

    /// Mine with a fixed issue time and salt.
    pub fn mine_with(resource: &str, difficulty_bits: u32, issued_at: i64, salt: u64) -> Self {
        let mut token = Self {
            issued_at,
            resource: stable_hash(resource),
            salt,
            counter: 0,
        };
        while !has_leading_zero_bits(&token.digest(), difficulty_bits) {
            token.counter = token.counter.wrapping_add(1);
        }
        token
    }

    /// Check resource, age and work against the verifier's clock `now` (ticks).
    pub fn validate(&self, resource: &str, difficulty_bits: u32, now: i64) -> bool {
        if self.resource != stable_hash(resource) {
            return false;
        }
        let age = now.saturating_sub(self.issued_at);
        if age > duration_ticks(MAX_AGE) || -age > duration_ticks(MAX_SKEW) {
            return false;
        }
        has_leading_zero_bits(&self.digest(), difficulty_bits)
    }

    /// SHA-256 of the wire encoding.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.encode()).into()
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Write the 28-byte encoding at the start of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) -> usize {
        let pos = codec::encode_u64(buf, 0, self.issued_at as u64);
        let pos = codec::encode_u32(buf, pos, self.resource as u32);
        let pos = codec::encode_u64(buf, pos, self.salt);
        codec::encode_u64(buf, pos, self.counter)
    }

    /// Decode from the first 28 bytes of `buf`; `None` if it is shorter.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let (issued_at, pos) = codec::decode_u64(buf, 0);
        let (resource, pos) = codec::decode_u32(buf, pos);
        let (salt, pos) = codec::decode_u64(buf, pos);
        let (counter, _) = codec::decode_u64(buf, pos);
        Some(Self {
            issued_at: issued_at as i64,
            resource: resource as i32,
            salt,
            counter,
        })
    }
}

/// Deterministic 32-bit string hash over UTF-16 code units.
///
/// Must not change: miner and verifier compute it independently.
pub fn stable_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(23i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// True if the first `bits` bits of `digest` are zero.
pub fn has_leading_zero_bits(digest: &[u8], bits: u32) -> bool {
    let bits = bits as usize;
    if bits > digest.len() * 8 {
        return false;
    }
    let full = bits / 8;
    if digest[..full].iter().any(|&b| b != 0) {
        return false;
    }
    let rest = bits % 8;
    rest == 0 || digest[full] >> (8 - rest) == 0
}

/// Ticks for a wall-clock time.
pub fn ticks_from_system_time(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH_TICKS + duration_ticks(since),
        Err(before) => UNIX_EPOCH_TICKS - duration_ticks(before.duration()),
    }
}

/// Current wall-clock time in ticks.
pub fn ticks_now() -> i64 {
    ticks_from_system_time(SystemTime::now())
}

pub fn duration_ticks(duration: Duration) -> i64 {
    (duration.as_nanos() / 100).min(i64::MAX as u128) as i64
}
