//! Channel pre-shared-key encryption.
//!
//! Mesh packets on a channel are encrypted with AES in counter mode. The
//! counter block is derived from the packet id and the sender, so the same
//! key never reuses a keystream for distinct packets from one node.

use crate::proto::{mesh_packet::PayloadVariant, Data, MeshPacket};
use crate::WireError;
use aes::cipher::{KeyIvInit, StreamCipher};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use prost::Message;
use tracing::trace;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Key used by channels configured with a one byte PSK index
pub const DEFAULT_KEY: [u8; 16] = [
    0xd4, 0xf1, 0xbb, 0x3a, 0x20, 0x29, 0x07, 0x59, 0xf0, 0xbc, 0xff, 0xab, 0xcf, 0x4e, 0x69, 0x01,
];

/// Counter block size
pub const NONCE_SIZE: usize = 16;

/// AES key material for one channel
#[derive(Clone, PartialEq, Eq)]
pub enum ChannelKey {
    /// 128-bit key
    Aes128([u8; 16]),
    /// 192-bit key
    Aes192([u8; 24]),
    /// 256-bit key
    Aes256([u8; 32]),
}

impl ChannelKey {
    /// Parse a base64-encoded PSK as shown by the device configuration
    pub fn from_base64(encoded: &str) -> Result<Self, WireError> {
        let psk = STANDARD
            .decode(encoded.trim())
            .map_err(|e| WireError::InvalidKey(format!("not base64: {}", e)))?;
        Self::from_psk(&psk)
    }

    /// Build a key from raw PSK bytes.
    ///
    /// A single byte `n` selects the default key with its last byte bumped by
    /// `n - 1`. Zero means an unencrypted channel and has no key.
    pub fn from_psk(psk: &[u8]) -> Result<Self, WireError> {
        match psk.len() {
            1 => match psk[0] {
                0 => Err(WireError::InvalidKey(
                    "PSK 0 disables encryption".to_string(),
                )),
                index => {
                    let mut key = DEFAULT_KEY;
                    key[15] = key[15].wrapping_add(index - 1);
                    Ok(Self::Aes128(key))
                }
            },
            16 => Ok(Self::Aes128(copy_key(psk))),
            24 => Ok(Self::Aes192(copy_key(psk))),
            32 => Ok(Self::Aes256(copy_key(psk))),
            len => Err(WireError::InvalidKey(format!(
                "unsupported key length {} (expected 1, 16, 24 or 32 bytes)",
                len
            ))),
        }
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Aes128(key) => key,
            Self::Aes192(key) => key,
            Self::Aes256(key) => key,
        }
    }

    /// Key size in bits
    pub fn bits(&self) -> usize {
        self.as_bytes().len() * 8
    }

    fn apply_keystream(&self, nonce: &[u8; NONCE_SIZE], buf: &mut [u8]) {
        match self {
            Self::Aes128(key) => Aes128Ctr::new(key.into(), nonce.into()).apply_keystream(buf),
            Self::Aes192(key) => Aes192Ctr::new(key.into(), nonce.into()).apply_keystream(buf),
            Self::Aes256(key) => Aes256Ctr::new(key.into(), nonce.into()).apply_keystream(buf),
        }
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelKey(AES-{})", self.bits())
    }
}

fn copy_key<const N: usize>(psk: &[u8]) -> [u8; N] {
    let mut key = [0u8; N];
    key.copy_from_slice(psk);
    key
}

/// Counter block for a packet: id LE at 0..4, sender LE at 8..12
pub fn nonce(packet_id: u32, from: u32) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..4].copy_from_slice(&packet_id.to_le_bytes());
    nonce[8..12].copy_from_slice(&from.to_le_bytes());
    nonce
}

/// Decrypt the payload of an encrypted packet.
///
/// The plaintext carries no integrity check, so a wrong key is only noticed
/// when the result does not parse as a [`Data`] envelope. That case is
/// reported as [`WireError::InvalidFormat`], never with decoder detail.
pub fn decrypt_psk(packet: &MeshPacket, key: &ChannelKey) -> Result<Data, WireError> {
    let encrypted = match &packet.payload_variant {
        Some(PayloadVariant::Encrypted(bytes)) => bytes,
        _ => return Err(WireError::NotEncrypted),
    };

    let mut plaintext = encrypted.clone();
    key.apply_keystream(&nonce(packet.id, packet.from), &mut plaintext);

    Data::decode(plaintext.as_slice()).map_err(|e| {
        trace!(
            component = "crypto",
            packet_id = packet.id,
            "Decrypted payload did not decode: {}", e
        );
        WireError::InvalidFormat
    })
}

/// Encrypt a data envelope for a packet with the given id and sender
pub fn encrypt_psk(packet_id: u32, from: u32, data: &Data, key: &ChannelKey) -> Vec<u8> {
    let mut buf = data.encode_to_vec();
    key.apply_keystream(&nonce(packet_id, from), &mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::PortNum;

    fn text_data(text: &str) -> Data {
        Data {
            portnum: PortNum::TextMessageApp as i32,
            payload: text.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    fn encrypted_packet(id: u32, from: u32, ciphertext: Vec<u8>) -> MeshPacket {
        MeshPacket {
            id,
            from,
            to: crate::proto::BROADCAST_ADDR,
            payload_variant: Some(PayloadVariant::Encrypted(ciphertext)),
            ..Default::default()
        }
    }

    #[test]
    fn test_nonce_layout() {
        let n = nonce(0x0403_0201, 0x0807_0605);
        assert_eq!(
            n,
            [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_default_key_shorthand() {
        let key = ChannelKey::from_base64("AQ==").unwrap();
        assert_eq!(key, ChannelKey::Aes128(DEFAULT_KEY));

        let full = ChannelKey::from_base64("1PG7OiApB1nwvP+rz05pAQ==").unwrap();
        assert_eq!(full, key);

        let bumped = ChannelKey::from_psk(&[3]).unwrap();
        let mut expected = DEFAULT_KEY;
        expected[15] = 0x03;
        assert_eq!(bumped.as_bytes(), &expected[..]);
    }

    #[test]
    fn test_key_sizes() {
        assert_eq!(ChannelKey::from_psk(&[7u8; 16]).unwrap().bits(), 128);
        assert_eq!(ChannelKey::from_psk(&[7u8; 24]).unwrap().bits(), 192);
        assert_eq!(ChannelKey::from_psk(&[7u8; 32]).unwrap().bits(), 256);
    }

    #[test]
    fn test_invalid_keys() {
        assert!(matches!(ChannelKey::from_psk(&[]), Err(WireError::InvalidKey(_))));
        assert!(matches!(ChannelKey::from_psk(&[0]), Err(WireError::InvalidKey(_))));
        assert!(matches!(ChannelKey::from_psk(&[1u8; 20]), Err(WireError::InvalidKey(_))));
        assert!(matches!(ChannelKey::from_base64("not base64!"), Err(WireError::InvalidKey(_))));
    }

    #[test]
    fn test_key_debug_hides_material() {
        let key = ChannelKey::from_psk(&[0x42; 32]).unwrap();
        let shown = format!("{:?}", key);
        assert_eq!(shown, "ChannelKey(AES-256)");
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let data = text_data("hello mesh");

        for key in [
            ChannelKey::from_psk(&[1]).unwrap(),
            ChannelKey::from_psk(&[0x11; 24]).unwrap(),
            ChannelKey::from_psk(&[0x22; 32]).unwrap(),
        ] {
            let ciphertext = encrypt_psk(0x1234_5678, 0xA1B2_C3D4, &data, &key);
            assert_ne!(ciphertext, data.encode_to_vec());

            let packet = encrypted_packet(0x1234_5678, 0xA1B2_C3D4, ciphertext);
            assert_eq!(decrypt_psk(&packet, &key).unwrap(), data);
        }
    }

    #[test]
    fn test_nonce_depends_on_id_and_sender() {
        let key = ChannelKey::from_psk(&[1]).unwrap();
        let data = text_data("same plaintext");

        let a = encrypt_psk(1, 100, &data, &key);
        let b = encrypt_psk(2, 100, &data, &key);
        let c = encrypt_psk(1, 101, &data, &key);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_wrong_key_never_yields_original() {
        let right = ChannelKey::from_psk(&[1]).unwrap();
        let data = text_data("a secret that should stay secret");
        let ciphertext = encrypt_psk(42, 7, &data, &right);
        let packet = encrypted_packet(42, 7, ciphertext);

        let mut failures = 0;
        for seed in 0u8..32 {
            let wrong = ChannelKey::from_psk(&[seed.wrapping_mul(31).wrapping_add(5); 16]).unwrap();
            match decrypt_psk(&packet, &wrong) {
                Err(WireError::InvalidFormat) => failures += 1,
                Ok(decoded) => assert_ne!(decoded, data),
                Err(other) => panic!("unexpected error {:?}", other),
            }
        }
        assert!(failures > 0, "no wrong key was rejected");
    }

    #[test]
    fn test_decrypt_requires_encrypted_payload() {
        let key = ChannelKey::from_psk(&[1]).unwrap();
        let packet = MeshPacket {
            payload_variant: Some(PayloadVariant::Decoded(text_data("plain"))),
            ..Default::default()
        };
        assert!(matches!(decrypt_psk(&packet, &key), Err(WireError::NotEncrypted)));

        let empty = MeshPacket::default();
        assert!(matches!(decrypt_psk(&empty, &key), Err(WireError::NotEncrypted)));
    }
}
