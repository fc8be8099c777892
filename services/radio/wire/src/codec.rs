//! Envelope codec: protobuf messages in and out of stream frames.
//!
//! The client encodes [`ToRadio`] and decodes [`FromRadio`]. The opposite
//! direction is provided as well so a simulated radio can speak the same
//! framing.

use crate::frame::{encode_frame, MAX_PAYLOAD_SIZE};
use crate::proto::{FromRadio, ToRadio};
use crate::WireError;
use bytes::Bytes;
use prost::Message;

fn encode_message<M: Message>(msg: &M) -> Result<Bytes, WireError> {
    let len = msg.encoded_len();
    if len > MAX_PAYLOAD_SIZE {
        return Err(WireError::Oversized {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    encode_frame(&msg.encode_to_vec())
}

/// Encode a client request into a complete frame
pub fn encode_to_radio(msg: &ToRadio) -> Result<Bytes, WireError> {
    encode_message(msg)
}

/// Decode a frame payload sent by the radio
pub fn decode_from_radio(payload: &[u8]) -> Result<FromRadio, WireError> {
    Ok(FromRadio::decode(payload)?)
}

/// Encode a radio message into a complete frame
pub fn encode_from_radio(msg: &FromRadio) -> Result<Bytes, WireError> {
    encode_message(msg)
}

/// Decode a frame payload sent by a client
pub fn decode_to_radio(payload: &[u8]) -> Result<ToRadio, WireError> {
    Ok(ToRadio::decode(payload)?)
}
