//! Wire protocol for talking to a mesh radio over a byte stream.
//!
//! This crate holds everything that is pure data transformation:
//!
//! - **Framing**: magic-prefixed, length-delimited frames with resync on noise
//! - **Envelopes**: the protobuf messages exchanged with the radio firmware
//! - **Channel crypto**: AES-CTR decryption of channel packets (feature `crypto`)
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | 0x94 0xC3            | frame magic                |
//! +----------------------+----------------------------+
//! | u16 len (BE)         | payload length, max 512    |
//! +----------------------+----------------------------+
//! | payload              | ToRadio / FromRadio        |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod proto;

#[cfg(feature = "crypto")]
pub mod crypto;

// Re-export main types
pub use codec::{decode_from_radio, decode_to_radio, encode_from_radio, encode_to_radio};
pub use error::WireError;
pub use frame::{
    encode_frame, DecoderStats, FrameDecoder, FRAME_HEADER_SIZE, FRAME_MAGIC, MAX_PAYLOAD_SIZE,
};
pub use proto::{
    Channel, ChannelSettings, Data, DeviceMetadata, FromRadio, LogRecord, MeshPacket, MyNodeInfo,
    NodeInfo, PortNum, Position, ToRadio, User, BROADCAST_ADDR,
};

#[cfg(feature = "crypto")]
pub use crypto::{decrypt_psk, encrypt_psk, nonce, ChannelKey, DEFAULT_KEY};
