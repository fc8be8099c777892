//! Basic usage example for the radio wire protocol.

use bytes::BytesMut;
use radio_wire::proto::{mesh_packet, to_radio};
use radio_wire::{
    decode_to_radio, decrypt_psk, encode_to_radio, encrypt_psk, ChannelKey, Data, FrameDecoder,
    MeshPacket, PortNum, ToRadio, BROADCAST_ADDR,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Radio Wire Protocol Example ===\n");

    // 1. Frame a text message request
    println!("1. Framing a text message...");
    let data = Data {
        portnum: PortNum::TextMessageApp as i32,
        payload: b"Hello, mesh network!".to_vec(),
        ..Default::default()
    };
    let packet = MeshPacket {
        from: 0xA1B2_C3D4,
        to: BROADCAST_ADDR,
        id: 42,
        hop_limit: 3,
        payload_variant: Some(mesh_packet::PayloadVariant::Decoded(data.clone())),
        ..Default::default()
    };
    let frame = encode_to_radio(&ToRadio::packet(packet))?;
    println!("   Encoded frame size: {} bytes", frame.len());

    // 2. Decode it back, with line noise in front
    println!("\n2. Decoding after line noise...");
    let mut buf = BytesMut::new();
    buf.extend_from_slice(b"boot log noise\r\n\x94");
    buf.extend_from_slice(&frame);

    let mut decoder = FrameDecoder::new();
    if let Some(payload) = decoder.decode(&mut buf) {
        if let Some(to_radio::PayloadVariant::Packet(packet)) =
            decode_to_radio(&payload)?.payload_variant
        {
            println!("   Packet id: {}", packet.id);
            println!("   Sender: !{:08x}", packet.from);
        }
    }
    println!(
        "   Skipped {} bytes while resyncing",
        decoder.stats().discarded_bytes
    );

    // 3. Channel encryption with the default key
    println!("\n3. Encrypting with the default channel key...");
    let key = ChannelKey::from_base64("AQ==")?;
    let ciphertext = encrypt_psk(42, 0xA1B2_C3D4, &data, &key);
    println!("   Ciphertext: {} bytes", ciphertext.len());

    let encrypted = MeshPacket {
        from: 0xA1B2_C3D4,
        id: 42,
        payload_variant: Some(mesh_packet::PayloadVariant::Encrypted(ciphertext)),
        ..Default::default()
    };
    let decrypted = decrypt_psk(&encrypted, &key)?;
    println!(
        "   Decrypted text: {:?}",
        std::str::from_utf8(&decrypted.payload)
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
