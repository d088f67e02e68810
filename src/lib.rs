//! # kcp-gate
//!
//! Reliable, ordered messaging over UDP using the KCP ARQ protocol, with a
//! HashCash proof-of-work handshake that admits a peer before the listener
//! spends any per-connection state on it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kcp_gate::{KcpConfig, KcpConnection, KcpListener};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KcpConfig::gaming().resource("game-v1").difficulty(12);
//!
//!     let mut listener = KcpListener::bind("127.0.0.1:0".parse()?, config.clone()).await?;
//!     let addr = *listener.local_addr();
//!
//!     tokio::spawn(async move {
//!         while let Ok((mut conn, _peer)) = listener.accept().await {
//!             tokio::spawn(async move {
//!                 while let Ok(msg) = conn.receive().await {
//!                     if conn.send(&msg).await.is_err() {
//!                         break;
//!                     }
//!                 }
//!             });
//!         }
//!     });
//!
//!     let mut client = KcpConnection::connect(addr, config).await?;
//!     client.send(b"Hello, KCP!").await?;
//!     println!("Echoed: {:?}", client.receive().await?);
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   High-Level API    │  KcpConnection, KcpListener
//! ├─────────────────────┤
//! │   Admission         │  HashCash greeting, replay guard
//! ├─────────────────────┤
//! │   Engine Actor      │  one task per connection
//! ├─────────────────────┤
//! │   Protocol Core     │  kcp-gate-core (sans-I/O engine)
//! ├─────────────────────┤
//! │   Transport Layer   │  UDP socket, packet I/O
//! └─────────────────────┘
//! ```

pub(crate) mod actor;
pub mod admission;
pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod message;
pub mod metrics;
pub mod transport;

// Re-exports
pub use actor::ConnectionState;
pub use admission::{Admission, Greeting, Rejection, ReplayGuard};
pub use config::{AdmissionConfig, DelayMode, KcpConfig, NodeDelayConfig};
pub use connection::KcpConnection;
pub use error::{ConnectionError, KcpError, Result};
pub use listener::KcpListener;
pub use message::MessageKind;
pub use metrics::{ListenerMetrics, MetricsSnapshot};
pub use transport::{Addr, Transport, UdpTransport};

pub use kcp_gate_core::{ConvId, HashCash, KcpStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: u32 = 1;
