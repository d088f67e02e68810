//! Error types for the async runtime.
//!
//! [`KcpError`] extends [`kcp_gate_core::KcpCoreError`] with the I/O,
//! connection and admission variants needed by connections and listeners.

use kcp_gate_core::KcpCoreError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KcpError>;

// ── Error types ─────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum KcpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Connection error: {kind}")]
    Connection { kind: ConnectionError },

    /// A message the engine refused; the core kind says whether to re-chunk or resize.
    #[error("Message error: {0}")]
    Message(#[source] KcpCoreError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Admission error: {message}")]
    Admission { message: String },
}

/// Why a connection is not (or no longer) usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    Closed,
    Lost,
    IdleTimeout,
    HandshakeFailed,
    NotConnected,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::Lost => write!(f, "connection lost"),
            Self::IdleTimeout => write!(f, "connection idle timeout"),
            Self::HandshakeFailed => write!(f, "handshake failed"),
            Self::NotConnected => write!(f, "not connected"),
        }
    }
}

// ── Bridge: core errors → KcpError ──────────────────────────────────────

impl From<KcpCoreError> for KcpError {
    fn from(e: KcpCoreError) -> Self {
        match e {
            KcpCoreError::Protocol(violation) => Self::protocol(violation.to_string()),
            KcpCoreError::Config { message } => Self::Config { message },
            e @ (KcpCoreError::EmptyMessage
            | KcpCoreError::MessageTooLarge { .. }
            | KcpCoreError::NoData
            | KcpCoreError::BufferTooSmall { .. }) => Self::Message(e),
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────────

impl KcpError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn connection(kind: ConnectionError) -> Self {
        Self::Connection { kind }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn admission(message: impl Into<String>) -> Self {
        Self::Admission {
            message: message.into(),
        }
    }
}

// ── Predicates ──────────────────────────────────────────────────────────

impl KcpError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            Self::Message(_) | Self::Protocol { .. } => true,
            _ => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection {
                kind: ConnectionError::Lost | ConnectionError::Closed | ConnectionError::IdleTimeout
            }
        )
    }

    /// The message has to be re-chunked or the buffer resized.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Message(e) if e.is_capacity())
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Connection { kind } => matches!(
                kind,
                ConnectionError::Closed | ConnectionError::Lost | ConnectionError::IdleTimeout
            ),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
