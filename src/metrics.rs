//! Listener-level admission counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the listener's receive task.
#[derive(Debug, Default)]
pub struct ListenerMetrics {
    /// Datagrams routed to an existing connection
    pub routed: AtomicU64,
    /// New peers that presented a valid token
    pub admitted: AtomicU64,
    /// First datagrams with an invalid, expired or foreign token
    pub rejected_tokens: AtomicU64,
    /// Valid tokens presented a second time
    pub rejected_replays: AtomicU64,
    /// Admitted peers dropped because the accept queue was full
    pub backlog_overflow: AtomicU64,
    /// First datagrams that were not a greeting at all
    pub malformed: AtomicU64,
}

impl ListenerMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            routed: self.routed.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_tokens: self.rejected_tokens.load(Ordering::Relaxed),
            rejected_replays: self.rejected_replays.load(Ordering::Relaxed),
            backlog_overflow: self.backlog_overflow.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub routed: u64,
    pub admitted: u64,
    pub rejected_tokens: u64,
    pub rejected_replays: u64,
    pub backlog_overflow: u64,
    pub malformed: u64,
}

impl MetricsSnapshot {
    /// Every first datagram that did not become a connection.
    pub fn rejected(&self) -> u64 {
        self.rejected_tokens + self.rejected_replays + self.backlog_overflow + self.malformed
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "admitted {}, routed {}, rejected {} (tokens {}, replays {}, backlog {}, malformed {})",
            self.admitted,
            self.routed,
            self.rejected(),
            self.rejected_tokens,
            self.rejected_replays,
            self.backlog_overflow,
            self.malformed,
        )
    }
}
