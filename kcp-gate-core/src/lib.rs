//! Pure synchronous KCP protocol engine with HashCash admission tokens.
//!
//! No tokio, no async, no I/O. The engine is driven by a caller-supplied
//! millisecond clock and produces datagrams the caller must transmit.
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │  kcp-gate-core                     │
//! │                                    │
//! │  codec     ← little-endian ints    │
//! │  buffer    ← datagram assembly     │
//! │  protocol  ← wire types            │
//! │  segment   ← segments + pool       │
//! │  config    ← tuning                │
//! │  error     ← error types           │
//! │  engine    ← ARQ state machine     │
//! │  hashcash  ← admission tokens      │
//! └────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod hashcash;
pub mod protocol;
pub mod segment;

pub use buffer::ByteBuffer;
pub use config::{DelayMode, KcpCoreConfig, NodeDelayConfig};
pub use engine::KcpEngine;
pub use error::{KcpCoreError, KcpCoreResult, Violation};
pub use hashcash::HashCash;
pub use protocol::*;
pub use segment::{Segment, SegmentPool};
