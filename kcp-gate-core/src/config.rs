//! Configuration types for the KCP core protocol engine

use crate::error::{KcpCoreError, KcpCoreResult};
use crate::protocol::constants;

/// Named latency/bandwidth trade-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayMode {
    /// Conservative: 40 ms flush, no fast resend, congestion control on.
    #[default]
    Normal,
    /// 30 ms flush, fast resend after 2 skips, no congestion window.
    Fast,
    /// No-delay RTO, 20 ms flush.
    Fast2,
    /// No-delay RTO, 10 ms flush.
    Fast3,
}

/// Node delay configuration for different performance modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDelayConfig {
    /// Enable no-delay mode (lower minimum RTO, gentler backoff)
    pub nodelay: bool,
    /// Internal update interval in milliseconds
    pub interval: u32,
    /// Fast resend threshold, 0 disables fast resend
    pub resend: u32,
    /// Disable congestion control
    pub no_congestion_control: bool,
}

impl NodeDelayConfig {
    pub fn normal() -> Self {
        Self::custom(false, 40, 0, false)
    }

    pub fn fast() -> Self {
        Self::custom(false, 30, 2, true)
    }

    pub fn fast2() -> Self {
        Self::custom(true, 20, 2, true)
    }

    pub fn fast3() -> Self {
        Self::custom(true, 10, 2, true)
    }

    /// Custom configuration
    pub fn custom(nodelay: bool, interval: u32, resend: u32, no_congestion_control: bool) -> Self {
        Self {
            nodelay,
            interval,
            resend,
            no_congestion_control,
        }
    }

    /// Minimum RTO implied by the no-delay flag.
    pub fn min_rto(&self) -> u32 {
        if self.nodelay {
            constants::IKCP_RTO_NDL
        } else {
            constants::IKCP_RTO_MIN
        }
    }
}

impl From<DelayMode> for NodeDelayConfig {
    fn from(mode: DelayMode) -> Self {
        match mode {
            DelayMode::Normal => Self::normal(),
            DelayMode::Fast => Self::fast(),
            DelayMode::Fast2 => Self::fast2(),
            DelayMode::Fast3 => Self::fast3(),
        }
    }
}

impl Default for NodeDelayConfig {
    fn default() -> Self {
        Self::normal()
    }
}

/// Protocol-only configuration for the KCP engine.
///
/// Contains only the fields the engine reads; no transport or I/O settings.
#[derive(Debug, Clone)]
pub struct KcpCoreConfig {
    /// Maximum transmission unit, reserved bytes included
    pub mtu: u32,
    /// Send window size in segments
    pub snd_wnd: u32,
    /// Receive window size in segments, raised to at least `IKCP_WND_RCV`
    pub rcv_wnd: u32,
    /// Node delay configuration
    pub nodelay: NodeDelayConfig,
    /// Bytes left free at the start of every datagram
    pub reserved: u32,
    /// Transmissions of a single segment before the link is declared dead
    pub dead_link: u32,
    /// Fast retransmissions allowed per segment, 0 means unlimited
    pub fast_limit: u32,
}

impl Default for KcpCoreConfig {
    fn default() -> Self {
        Self {
            mtu: constants::IKCP_MTU_DEF,
            snd_wnd: constants::IKCP_WND_SND,
            rcv_wnd: constants::IKCP_WND_RCV,
            nodelay: NodeDelayConfig::normal(),
            reserved: 0,
            dead_link: constants::IKCP_DEADLINK,
            fast_limit: constants::IKCP_FASTACK_LIMIT,
        }
    }
}

impl KcpCoreConfig {
    pub fn validate(&self) -> KcpCoreResult<()> {
        if !(constants::IKCP_MTU_MIN..=constants::IKCP_MTU_MAX).contains(&self.mtu) {
            return Err(KcpCoreError::config(format!(
                "MTU must be between {} and {}",
                constants::IKCP_MTU_MIN,
                constants::IKCP_MTU_MAX
            )));
        }
        if self.reserved + 1 >= self.mtu - constants::IKCP_OVERHEAD {
            return Err(KcpCoreError::config(
                "Reserved bytes must leave room for at least one payload byte",
            ));
        }
        if self.snd_wnd == 0 || self.rcv_wnd == 0 {
            return Err(KcpCoreError::config("Window sizes must be greater than 0"));
        }
        if self.nodelay.interval == 0 {
            return Err(KcpCoreError::config("Update interval must be greater than 0"));
        }
        if self.dead_link == 0 {
            return Err(KcpCoreError::config("Dead link threshold must be greater than 0"));
        }
        Ok(())
    }

    /// Maximum payload bytes per segment.
    pub fn mss(&self) -> u32 {
        self.mtu - constants::IKCP_OVERHEAD - self.reserved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let normal = NodeDelayConfig::from(DelayMode::Normal);
        assert!(!normal.nodelay);
        assert_eq!(normal.min_rto(), constants::IKCP_RTO_MIN);

        let fast3 = NodeDelayConfig::from(DelayMode::Fast3);
        assert!(fast3.nodelay);
        assert_eq!(fast3.interval, 10);
        assert_eq!(fast3.resend, 2);
        assert_eq!(fast3.min_rto(), constants::IKCP_RTO_NDL);
    }

    #[test]
    fn test_validate() {
        let config = KcpCoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mss(), 1176);

        let config = KcpCoreConfig {
            mtu: 49,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = KcpCoreConfig {
            mtu: 100,
            reserved: 75,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = KcpCoreConfig {
            mtu: 100,
            reserved: 74,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.mss(), 2);
    }
}
