//! Error types for the KCP core protocol engine

use thiserror::Error;

/// Result type for KCP core operations
pub type KcpCoreResult<T> = std::result::Result<T, KcpCoreError>;

/// Why an inbound frame was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("frame of {0} bytes is shorter than the header")]
    TooShort(usize),
    #[error("conversation {actual} does not match {expected}")]
    ConvMismatch { expected: u32, actual: u32 },
    #[error("unknown command byte {0}")]
    UnknownCommand(u8),
    #[error("declared payload of {declared} bytes exceeds the {remaining} remaining")]
    Truncated { declared: u32, remaining: usize },
}

/// Error types produced by the KCP protocol engine.
#[derive(Debug, Error)]
pub enum KcpCoreError {
    /// Malformed remote input; the rest of the datagram was discarded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] Violation),

    #[error("Refusing to send an empty message")]
    EmptyMessage,

    /// The peer could never reassemble a message with this many fragments.
    #[error("Message of {fragments} fragments exceeds receive window {window}")]
    MessageTooLarge { fragments: usize, window: u32 },

    #[error("No complete message available")]
    NoData,

    #[error("Buffer too small: message needs {needed} bytes, buffer has {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl KcpCoreError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        KcpCoreError::Config {
            message: message.into(),
        }
    }

    /// Errors the caller has to resolve by resizing or re-chunking.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            KcpCoreError::EmptyMessage
                | KcpCoreError::MessageTooLarge { .. }
                | KcpCoreError::BufferTooSmall { .. }
        )
    }

    /// Errors after which the engine should not keep running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KcpCoreError::Config { .. })
    }
}
