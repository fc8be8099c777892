//! Subscribers used by `radio listen`.

use std::sync::Arc;

use async_trait::async_trait;
use radio_session::{format_node, DropOldestQueue, PacketSubscriber};
use radio_wire::proto::from_radio::PayloadVariant;
use radio_wire::{decrypt_psk, ChannelKey, Data, FromRadio, MeshPacket, PortNum, WireError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Plaintext of a packet, decrypting with `key` when the radio could not
pub fn open_packet(packet: &MeshPacket, key: &ChannelKey) -> Result<Data, WireError> {
    match packet.decoded() {
        Some(data) => Ok(data.clone()),
        None => decrypt_psk(packet, key),
    }
}

/// Whether a message carries a mesh packet
pub fn is_mesh_packet(msg: &FromRadio) -> bool {
    matches!(msg.payload_variant, Some(PayloadVariant::Packet(_)))
}

/// Logs a one-line summary of every inbound message
pub struct PacketLogger {
    key: ChannelKey,
}

impl PacketLogger {
    pub fn new(key: ChannelKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl PacketSubscriber for PacketLogger {
    async fn on_packet(&self, msg: &FromRadio) {
        match &msg.payload_variant {
            Some(PayloadVariant::Packet(packet)) => match open_packet(packet, &self.key) {
                Ok(data) => info!(
                    component = "listen",
                    packet_id = packet.id,
                    from = %format_node(packet.from),
                    to = %format_node(packet.to),
                    port = ?data.port(),
                    len = data.payload.len(),
                    snr = packet.rx_snr,
                    rssi = packet.rx_rssi,
                    encrypted = packet.encrypted().is_some(),
                    "Packet"
                ),
                Err(e) => info!(
                    component = "listen",
                    packet_id = packet.id,
                    from = %format_node(packet.from),
                    "Packet not readable with this channel key: {}", e
                ),
            },
            Some(PayloadVariant::LogRecord(record)) => {
                debug!(component = "firmware", source = %record.source, "{}", record.message)
            }
            Some(PayloadVariant::Rebooted(_)) => info!(component = "listen", "Radio rebooted"),
            _ => debug!(component = "listen", kind = msg.kind(), "Message"),
        }
    }
}

/// Print text messages from `queue` to stdout until cancelled or closed
pub async fn print_text_messages(
    queue: Arc<DropOldestQueue<FromRadio>>,
    key: ChannelKey,
    cancel: CancellationToken,
) {
    while let Ok(msg) = queue.pop(&cancel).await {
        let Some(packet) = msg.into_packet() else {
            continue;
        };
        if let Some(line) = render_text(&packet, &key) {
            println!("{}", line);
        }
    }

    let dropped = queue.dropped();
    if dropped > 0 {
        info!(component = "listen", dropped, "Text printer fell behind and skipped messages");
    }
}

fn render_text(packet: &MeshPacket, key: &ChannelKey) -> Option<String> {
    let data = open_packet(packet, key).ok()?;
    if data.port() != Some(PortNum::TextMessageApp) {
        return None;
    }

    let received = match packet.rx_time {
        0 => None,
        secs => chrono::DateTime::<chrono::Utc>::from_timestamp(secs as i64, 0),
    };
    let time = received
        .map(|ts| ts.with_timezone(&chrono::Local))
        .unwrap_or_else(chrono::Local::now)
        .format("%H:%M:%S");

    Some(format!(
        "{} {} -> {}: {}",
        time,
        format_node(packet.from),
        format_node(packet.to),
        String::from_utf8_lossy(&data.payload)
    ))
}
