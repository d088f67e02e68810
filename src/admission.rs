//! HashCash admission: async mining for clients, greeting inspection and
//! replay tracking for listeners.

use crate::config::AdmissionConfig;
use crate::error::{KcpError, Result};
use crate::message::MessageKind;

use dashmap::DashMap;
use kcp_gate_core::hashcash::{self, HashCash};
use kcp_gate_core::{Command, ConvId, SegmentHeader, Violation};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Payload of the client greeting: kind byte + encoded token.
pub const GREETING_LEN: usize = 1 + HashCash::SIZE;

/// Mine a token on the blocking pool so the runtime keeps serving other tasks.
pub async fn mine_token(config: &AdmissionConfig) -> Result<HashCash> {
    let resource = config.resource.clone();
    let bits = config.difficulty_bits;
    let started = Instant::now();

    let token = tokio::task::spawn_blocking(move || HashCash::mine(&resource, bits))
        .await
        .map_err(|e| KcpError::admission(format!("mining task failed: {}", e)))?;

    debug!(
        bits,
        counter = token.counter,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Admission token mined"
    );
    Ok(token)
}

/// Why a first datagram did not open a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("not a greeting: {0}")]
    Malformed(String),
    #[error("token invalid, expired or for another resource")]
    InvalidToken,
    #[error("token already used")]
    Replayed,
}

impl From<Violation> for Rejection {
    fn from(v: Violation) -> Self {
        Rejection::Malformed(v.to_string())
    }
}

/// An admitted client greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Greeting {
    pub conv: ConvId,
    pub token: HashCash,
}

/// Tokens that already opened a connection, kept until they expire.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    seen: DashMap<(i32, u64, u64), i64>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `token`; false if it was already recorded.
    pub fn check_and_insert(&self, token: &HashCash) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.seen.entry((token.resource, token.salt, token.counter)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(token.issued_at);
                true
            }
        }
    }

    /// Forget tokens too old to validate anyway. Returns how many were dropped.
    pub fn purge(&self, now: i64) -> usize {
        let max_age = hashcash::duration_ticks(hashcash::MAX_AGE);
        let before = self.seen.len();
        self.seen
            .retain(|_, issued_at| now.saturating_sub(*issued_at) <= max_age);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Listener-side admission policy.
#[derive(Debug)]
pub struct Admission {
    config: AdmissionConfig,
    replays: ReplayGuard,
}

impl Admission {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            replays: ReplayGuard::new(),
        }
    }

    /// Decide whether the first datagram from an unknown peer opens a
    /// connection. Only the first frame is inspected: it must be the
    /// client's greeting, `Push` with `sn == 0` carrying `Hello` + token.
    pub fn inspect(
        &self,
        datagram: &[u8],
        reserved: usize,
        now: i64,
    ) -> std::result::Result<Greeting, Rejection> {
        let frame = datagram
            .get(reserved..)
            .ok_or_else(|| Rejection::Malformed("shorter than reserved prefix".into()))?;
        let header = SegmentHeader::decode(frame)?;

        if header.cmd != Command::Push || header.sn != 0 || header.frg != 0 {
            return Err(Rejection::Malformed(format!(
                "first frame is {} sn {} frg {}",
                header.cmd.as_str(),
                header.sn,
                header.frg
            )));
        }
        let payload = &frame[SegmentHeader::SIZE..header.frame_len()];
        if payload.len() != GREETING_LEN || payload[0] != MessageKind::Hello as u8 {
            return Err(Rejection::Malformed("first message is not a greeting".into()));
        }

        let token = HashCash::decode(&payload[1..])
            .ok_or_else(|| Rejection::Malformed("short token".into()))?;
        if !token.validate(&self.config.resource, self.config.difficulty_bits, now) {
            return Err(Rejection::InvalidToken);
        }
        if self.config.reject_replays && !self.replays.check_and_insert(&token) {
            return Err(Rejection::Replayed);
        }

        Ok(Greeting {
            conv: header.conv,
            token,
        })
    }

    /// Drop expired replay entries.
    pub fn purge(&self, now: i64) -> usize {
        self.replays.purge(now)
    }

    pub fn tracked_tokens(&self) -> usize {
        self.replays.len()
    }
}
