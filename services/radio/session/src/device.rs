//! Device session: mesh packets over a hardware transport.
//!
//! A [`Device`] owns the node identity used for outgoing packets and the
//! packet id sequence, and filters the hardware message stream down to mesh
//! packets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use radio_wire::proto::mesh_packet;
use radio_wire::{Data, MeshPacket, PortNum, ToRadio, BROADCAST_ADDR};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument, Span};

use crate::error::Result;
use crate::handshake::{ConfigSync, DeviceState, PendingRequests};
use crate::transport::{HardwareTransport, MeshTransport};

/// Hop limit applied to packets that do not set one
pub const DEFAULT_HOP_LIMIT: u32 = 3;

const ID_SEQUENCE_MASK: u32 = 0x3FF;

/// Parameters for [`Device::send_data`]
#[derive(Debug, Clone)]
pub struct SendDataParams {
    /// Target application
    pub portnum: PortNum,
    /// Application payload
    pub payload: Vec<u8>,
    /// Destination node, [`BROADCAST_ADDR`] for everyone
    pub dest_node: u32,
    /// Ask the recipient for an acknowledgement
    pub want_ack: bool,
    /// Channel slot to send on
    pub channel_index: u32,
    /// Packet this one replies to, or 0
    pub reply_id: u32,
}

impl SendDataParams {
    /// Broadcast text message on the primary channel
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            portnum: PortNum::TextMessageApp,
            payload: text.into().into_bytes(),
            dest_node: BROADCAST_ADDR,
            want_ack: false,
            channel_index: 0,
            reply_id: 0,
        }
    }
}

/// Mesh session bound to one radio
pub struct Device {
    transport: Arc<dyn HardwareTransport>,
    node_id: u32,
    last_packet_id: AtomicU32,
    pending: Arc<PendingRequests>,
    span: Span,
}

impl Device {
    /// Session with a known node identity
    pub fn new(transport: Arc<dyn HardwareTransport>, node_id: u32) -> Self {
        Self {
            transport,
            node_id,
            last_packet_id: AtomicU32::new(0),
            pending: Arc::new(PendingRequests::new()),
            span: tracing::info_span!("device", node = %format_node(node_id)),
        }
    }

    /// Run the configuration handshake and adopt the radio's node identity.
    ///
    /// The collected state is returned alongside the session.
    pub async fn connect(
        transport: Arc<dyn HardwareTransport>,
        cancel: &CancellationToken,
    ) -> Result<(Self, DeviceState)> {
        let pending = Arc::new(PendingRequests::new());
        let state = ConfigSync::new(transport.clone())
            .with_pending(pending.clone())
            .get_state(cancel)
            .await?;

        let node_id = match &state.my_info {
            Some(info) => info.my_node_num,
            None => {
                warn!(
                    component = "device",
                    "Radio sent no identity, outgoing packets will carry node 0"
                );
                0
            }
        };

        let mut device = Self::new(transport, node_id);
        device.pending = pending;
        debug!(component = "device", node = %format_node(node_id), "Device session ready");
        Ok((device, state))
    }

    /// Use a caller-provided span for this session's log events
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Node number stamped on outgoing packets
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// The hardware link this session runs on
    pub fn transport(&self) -> &Arc<dyn HardwareTransport> {
        &self.transport
    }

    /// Handshake runner sharing this session's transport and pending table
    pub fn config_sync(&self) -> ConfigSync {
        ConfigSync::new(self.transport.clone()).with_pending(self.pending.clone())
    }

    /// Re-read the full device state
    pub async fn get_state(&self, cancel: &CancellationToken) -> Result<DeviceState> {
        self.config_sync()
            .with_span(self.span.clone())
            .get_state(cancel)
            .await
    }

    /// Next packet id.
    ///
    /// The low 10 bits count up and wrap; the high bits are random on every
    /// call. An id is never 0.
    pub fn next_packet_id(&self) -> u32 {
        let prev = self.last_packet_id.fetch_add(1, Ordering::Relaxed);
        let sequence = prev.wrapping_add(1) & ID_SEQUENCE_MASK;
        let id = sequence | (rand::random::<u32>() & !ID_SEQUENCE_MASK);
        if id == 0 {
            ID_SEQUENCE_MASK + 1
        } else {
            id
        }
    }

    /// Build and send a data packet, returning its id
    pub async fn send_data(&self, params: SendDataParams) -> Result<u32> {
        let id = self.next_packet_id();
        let packet = MeshPacket {
            to: params.dest_node,
            channel: params.channel_index,
            id,
            want_ack: params.want_ack,
            payload_variant: Some(mesh_packet::PayloadVariant::Decoded(Data {
                portnum: params.portnum as i32,
                payload: params.payload,
                reply_id: params.reply_id,
                ..Default::default()
            })),
            ..Default::default()
        };

        self.send_to_mesh(packet).await?;
        Ok(id)
    }

    async fn send_packet(&self, mut packet: MeshPacket) -> Result<()> {
        packet.from = self.node_id;
        if packet.id == 0 {
            packet.id = self.next_packet_id();
        }
        if packet.hop_limit == 0 {
            packet.hop_limit = DEFAULT_HOP_LIMIT;
        }

        debug!(
            component = "device",
            packet_id = packet.id,
            to = %format_node(packet.to),
            channel = packet.channel,
            "Sending packet"
        );
        self.transport.send_to_radio(ToRadio::packet(packet)).await
    }

    async fn next_packet(&self, cancel: &CancellationToken) -> Result<MeshPacket> {
        loop {
            let msg = self.transport.receive_from_radio(cancel).await?;
            let kind = msg.kind();
            match msg.into_packet() {
                Some(packet) => {
                    trace!(
                        component = "device",
                        packet_id = packet.id,
                        from = %format_node(packet.from),
                        "Packet received"
                    );
                    return Ok(packet);
                }
                None => trace!(component = "device", kind, "Skipping non-packet message"),
            }
        }
    }
}

#[async_trait]
impl MeshTransport for Device {
    async fn send_to_mesh(&self, packet: MeshPacket) -> Result<()> {
        self.send_packet(packet).instrument(self.span.clone()).await
    }

    async fn receive_from_mesh(&self, cancel: &CancellationToken) -> Result<MeshPacket> {
        self.next_packet(cancel).instrument(self.span.clone()).await
    }
}

/// Render a node number the way the firmware shows user ids
pub fn format_node(num: u32) -> String {
    if num == BROADCAST_ADDR {
        "^all".to_string()
    } else {
        format!("!{:08x}", num)
    }
}
