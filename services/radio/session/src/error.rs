//! Session error types.

use radio_wire::WireError;
use thiserror::Error;

/// Result alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by transports and the device session
#[derive(Error, Debug)]
pub enum SessionError {
    /// The underlying byte stream or link failed
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// The transport was closed and will not produce more messages
    #[error("transport closed")]
    Closed,

    /// A frame payload was not a valid envelope
    #[error("protocol decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Decrypted or reassembled data was not a valid envelope
    #[error("invalid packet data format")]
    InvalidFormat,

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Outgoing message breaks a protocol limit
    #[error("protocol violation: message of {size} bytes exceeds {max}")]
    Violation {
        /// Encoded size
        size: usize,
        /// Limit that was exceeded
        max: usize,
    },

    /// The transport does not support the requested operation
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Oversized { size, max } => SessionError::Violation { size, max },
            WireError::Decode(e) => SessionError::Decode(e),
            WireError::InvalidFormat | WireError::NotEncrypted | WireError::InvalidKey(_) => {
                SessionError::InvalidFormat
            }
            WireError::Io(e) => SessionError::Transport(e),
        }
    }
}

impl SessionError {
    /// Whether the transport can no longer be used after this error
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_) | SessionError::Closed | SessionError::Cancelled
        )
    }
}
