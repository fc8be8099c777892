//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Outgoing payload does not fit in a single frame
    #[error("payload too large: {size} bytes (max {max})")]
    Oversized {
        /// Actual payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Bytes where an envelope was expected did not decode
    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Decrypted payload is not a valid data envelope
    #[error("invalid packet data format")]
    InvalidFormat,

    /// Packet does not carry an encrypted payload
    #[error("packet payload is not encrypted")]
    NotEncrypted,

    /// Channel key material is unusable
    #[error("invalid channel key: {0}")]
    InvalidKey(String),

    /// Underlying byte stream failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WireError::Oversized { size: 600, max: 512 };
        assert_eq!(err.to_string(), "payload too large: 600 bytes (max 512)");

        let err = WireError::InvalidKey("bad length 5".to_string());
        assert!(err.to_string().contains("bad length 5"));
    }
}
