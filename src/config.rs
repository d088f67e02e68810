//! Configuration types.
//!
//! [`KcpConfig`] extends the core [`KcpCoreConfig`] fields with connection
//! timeouts, listener limits and the admission policy.

use crate::error::{KcpError, Result};
use kcp_gate_core::hashcash;
use kcp_gate_core::KcpCoreConfig;
use std::time::Duration;

// Re-export from the core so users see a single set of tuning types.
pub use kcp_gate_core::config::{DelayMode, NodeDelayConfig};

// ── AdmissionConfig ─────────────────────────────────────────────────────

/// Proof-of-work policy shared by client (miner) and listener (verifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Resource name bound into every token; both sides must agree.
    pub resource: String,
    /// Required leading zero bits of the token digest, `0..=256`.
    pub difficulty_bits: u32,
    /// Refuse a token that has already opened a connection.
    pub reject_replays: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            resource: "kcp-gate".to_string(),
            difficulty_bits: 16,
            reject_replays: true,
        }
    }
}

// ── KcpConfig ───────────────────────────────────────────────────────────

/// Full configuration: protocol settings + runtime settings.
#[derive(Debug, Clone)]
pub struct KcpConfig {
    // Protocol settings (forwarded to the core engine)
    pub mtu: u32,
    pub snd_wnd: u32,
    pub rcv_wnd: u32,
    pub nodelay: NodeDelayConfig,
    pub reserved: u32,
    pub dead_link: u32,
    pub fast_limit: u32,

    // Runtime settings
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub keep_alive: Duration,
    pub close_linger: Duration,
    pub max_pending_connections: usize,
    pub cleanup_interval: Duration,
    /// Assembled messages buffered ahead of `receive`.
    pub message_queue: usize,
    pub admission: AdmissionConfig,
}

impl Default for KcpConfig {
    fn default() -> Self {
        let core = KcpCoreConfig::default();
        Self {
            mtu: core.mtu,
            snd_wnd: core.snd_wnd,
            rcv_wnd: core.rcv_wnd,
            nodelay: core.nodelay,
            reserved: core.reserved,
            dead_link: core.dead_link,
            fast_limit: core.fast_limit,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(1),
            close_linger: Duration::from_secs(2),
            max_pending_connections: 256,
            cleanup_interval: Duration::from_secs(30),
            message_queue: 256,
            admission: AdmissionConfig::default(),
        }
    }
}

/// Extracts the protocol-only fields that `KcpEngine` reads.
impl From<&KcpConfig> for KcpCoreConfig {
    fn from(c: &KcpConfig) -> Self {
        Self {
            mtu: c.mtu,
            snd_wnd: c.snd_wnd,
            rcv_wnd: c.rcv_wnd,
            nodelay: c.nodelay.clone(),
            reserved: c.reserved,
            dead_link: c.dead_link,
            fast_limit: c.fast_limit,
        }
    }
}

// ── Builder methods ─────────────────────────────────────────────────────

impl KcpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Protocol tuning --

    pub fn mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn window_size(mut self, snd_wnd: u32, rcv_wnd: u32) -> Self {
        self.snd_wnd = snd_wnd;
        self.rcv_wnd = rcv_wnd;
        self
    }

    pub fn delay_mode(mut self, mode: DelayMode) -> Self {
        self.nodelay = mode.into();
        self
    }

    pub fn nodelay_config(mut self, config: NodeDelayConfig) -> Self {
        self.nodelay = config;
        self
    }

    pub fn reserved(mut self, reserved: u32) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn dead_link(mut self, transmissions: u32) -> Self {
        self.dead_link = transmissions;
        self
    }

    // -- Runtime tuning --

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn close_linger(mut self, linger: Duration) -> Self {
        self.close_linger = linger;
        self
    }

    pub fn max_pending_connections(mut self, max: usize) -> Self {
        self.max_pending_connections = max;
        self
    }

    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn message_queue(mut self, capacity: usize) -> Self {
        self.message_queue = capacity;
        self
    }

    // -- Admission --

    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.admission.resource = resource.into();
        self
    }

    pub fn difficulty(mut self, bits: u32) -> Self {
        self.admission.difficulty_bits = bits;
        self
    }

    pub fn reject_replays(mut self, enabled: bool) -> Self {
        self.admission.reject_replays = enabled;
        self
    }

    // -- Validation --

    pub fn validate(&self) -> Result<()> {
        KcpCoreConfig::from(self).validate()?;

        if self.idle_timeout.is_zero() || self.keep_alive.is_zero() {
            return Err(KcpError::config("Idle timeout and keep-alive must be non-zero"));
        }
        if self.keep_alive >= self.idle_timeout {
            return Err(KcpError::config("Keep-alive must be shorter than the idle timeout"));
        }
        if self.connect_timeout.is_zero() {
            return Err(KcpError::config("Connect timeout must be non-zero"));
        }
        if self.max_pending_connections == 0 || self.message_queue == 0 {
            return Err(KcpError::config("Queue capacities must be greater than 0"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(KcpError::config("Cleanup interval must be non-zero"));
        }
        if self.admission.difficulty_bits > hashcash::MAX_DIFFICULTY {
            return Err(KcpError::config(format!(
                "Difficulty must be at most {} bits",
                hashcash::MAX_DIFFICULTY
            )));
        }
        Ok(())
    }
}

// ── Presets ──────────────────────────────────────────────────────────────

impl KcpConfig {
    pub fn gaming() -> Self {
        Self::default()
            .delay_mode(DelayMode::Fast3)
            .window_size(64, 128)
            .connect_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(5))
            .keep_alive(Duration::from_millis(500))
    }

    pub fn realtime() -> Self {
        Self::default()
            .delay_mode(DelayMode::Fast)
            .window_size(64, 128)
            .connect_timeout(Duration::from_secs(3))
    }
}
