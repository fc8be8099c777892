//! Stream framing for byte-oriented transports.
//!
//! Serial ports and TCP sockets carry radio envelopes as length-delimited
//! frames. Each frame starts with a fixed two byte magic so a reader can
//! resynchronize after line noise or after attaching to a device mid-frame.
//!
//! ```text
//! +------+------+--------+--------+-------------------+
//! | 0x94 | 0xC3 | len_hi | len_lo | payload[0..len]   |
//! +------+------+--------+--------+-------------------+
//! ```

use crate::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

/// Frame start marker
pub const FRAME_MAGIC: [u8; 2] = [0x94, 0xC3];

/// Magic plus big-endian u16 length
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest payload a single frame may carry
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Encode a payload into a complete frame.
///
/// Payloads longer than [`MAX_PAYLOAD_SIZE`] are rejected; a truncated frame
/// is never produced.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::Oversized {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&FRAME_MAGIC);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Counters describing what the decoder had to throw away
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames returned to the caller
    pub frames: u64,
    /// Bytes skipped while searching for a frame start
    pub discarded_bytes: u64,
    /// Headers rejected because their length exceeded the maximum
    pub corrupt_headers: u64,
}

/// Frame decoder for parsing incoming frames
///
/// The decoder never assumes alignment: anything that is not a valid header
/// is skipped until the next magic sequence. It never fails; a corrupt header
/// only costs the bytes that were skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    stats: DecoderStats,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame payload from a buffer.
    ///
    /// Returns `None` when the buffer does not yet hold a complete frame.
    /// Bytes belonging to an incomplete frame stay in `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            match buf.iter().position(|&b| b == FRAME_MAGIC[0]) {
                Some(0) => {}
                Some(pos) => self.discard(buf, pos),
                None => {
                    let len = buf.len();
                    self.discard(buf, len);
                    return None;
                }
            }

            if buf.len() < FRAME_MAGIC.len() {
                return None;
            }

            // A lone start byte is dropped on its own so the next byte is
            // still considered as a frame start.
            if buf[1] != FRAME_MAGIC[1] {
                self.discard(buf, 1);
                continue;
            }

            if buf.len() < FRAME_HEADER_SIZE {
                return None;
            }

            let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
            if len > MAX_PAYLOAD_SIZE {
                self.stats.corrupt_headers += 1;
                debug!(
                    component = "frame",
                    "Frame header announces {} bytes (max {}), resyncing", len, MAX_PAYLOAD_SIZE
                );
                // Only the magic goes; the length bytes may start the next frame
                self.discard(buf, FRAME_MAGIC.len());
                continue;
            }

            if buf.len() < FRAME_HEADER_SIZE + len {
                return None;
            }

            buf.advance(FRAME_HEADER_SIZE);
            self.stats.frames += 1;
            return Some(buf.split_to(len).freeze());
        }
    }

    /// Counters accumulated since the decoder was created
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn discard(&mut self, buf: &mut BytesMut, count: usize) {
        if count == 0 {
            return;
        }
        trace!(component = "frame", "Discarding {} bytes of stream noise", count);
        buf.advance(count);
        self.stats.discarded_bytes += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut FrameDecoder, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(buf) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_encode_header() {
        let payload = vec![0xAB; 258];
        let frame = encode_frame(&payload).unwrap();

        assert_eq!(frame.len(), FRAME_HEADER_SIZE + 258);
        assert_eq!(&frame[..4], &[0x94, 0xC3, 0x01, 0x02]);
        assert_eq!(&frame[4..], &payload[..]);
    }

    #[test]
    fn test_roundtrip_every_length() {
        let mut decoder = FrameDecoder::new();

        for len in 0..=MAX_PAYLOAD_SIZE {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            let mut buf = BytesMut::from(&encode_frame(&payload).unwrap()[..]);

            let decoded = decoder.decode(&mut buf).expect("complete frame");
            assert_eq!(&decoded[..], &payload[..], "length {}", len);
            assert!(buf.is_empty());
        }

        assert_eq!(decoder.stats().frames, (MAX_PAYLOAD_SIZE + 1) as u64);
        assert_eq!(decoder.stats().discarded_bytes, 0);
    }

    #[test]
    fn test_encode_oversized_fails() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        match encode_frame(&payload) {
            Err(WireError::Oversized { size, max }) => {
                assert_eq!(size, 513);
                assert_eq!(max, 512);
            }
            other => panic!("expected oversized error, got {:?}", other),
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        // Noise ends with a lone start byte directly in front of the frame
        buf.extend_from_slice(&[0x00, 0xFF, 0x94, 0x12, 0x94]);
        buf.extend_from_slice(&encode_frame(b"hello").unwrap());

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert_eq!(decoder.stats().discarded_bytes, 5);
    }

    #[test]
    fn test_corrupt_length_is_skipped() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&[0x94, 0xC3, 0x03, 0x00]); // 768 bytes announced
        buf.extend_from_slice(&encode_frame(b"after").unwrap());

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"after");
        assert_eq!(decoder.stats().corrupt_headers, 1);
    }

    #[test]
    fn test_frame_inside_corrupt_length_is_found() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();

        // stray magic, so the real frame's magic reads as the length 0x94C3
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&encode_frame(b"inside").unwrap());

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"inside");
        assert_eq!(decoder.stats().corrupt_headers, 1);
        assert_eq!(decoder.stats().discarded_bytes, 2);
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let mut decoder = FrameDecoder::new();
        let encoded = encode_frame(b"Test data").unwrap();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&encoded[..1]);
        assert!(decoder.decode(&mut buf).is_none());
        buf.extend_from_slice(&encoded[1..6]);
        assert!(decoder.decode(&mut buf).is_none());
        assert_eq!(buf.len(), 6);

        buf.extend_from_slice(&encoded[6..]);
        let decoded = decoder.decode(&mut buf).expect("complete frame");
        assert_eq!(&decoded[..], b"Test data");
        assert_eq!(decoder.stats().discarded_bytes, 0);
    }

    #[test]
    fn test_multiple_frames() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"First").unwrap());
        buf.extend_from_slice(&encode_frame(b"").unwrap());
        buf.extend_from_slice(&encode_frame(b"Second").unwrap());

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"First");
        assert!(frames[1].is_empty());
        assert_eq!(&frames[2][..], b"Second");
        assert!(buf.is_empty());
    }
}
