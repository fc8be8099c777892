//! Radio envelope messages.
//!
//! These are the protobuf messages exchanged with the device firmware. Field
//! numbers follow the Meshtastic schema so frames from real hardware decode
//! directly. Only the fields this client acts on are declared; everything
//! else is skipped by the decoder as unknown.

use prost::Message;

/// Destination address that reaches every node
pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;

/// Application port a data payload is addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PortNum {
    /// Unset or unknown application
    UnknownApp = 0,
    /// UTF-8 text message
    TextMessageApp = 1,
    /// Remote GPIO control
    RemoteHardwareApp = 2,
    /// Position report
    PositionApp = 3,
    /// User info broadcast
    NodeinfoApp = 4,
    /// Routing control, including ACK/NAK
    RoutingApp = 5,
    /// Administrative messages
    AdminApp = 6,
    /// Compressed text message
    TextMessageCompressedApp = 7,
    /// Waypoint
    WaypointApp = 8,
    /// Audio frames
    AudioApp = 9,
    /// Detection sensor events
    DetectionSensorApp = 10,
    /// Reply service
    ReplyApp = 32,
    /// IP tunnel
    IpTunnelApp = 33,
    /// Pax counter
    PaxcounterApp = 34,
    /// Serial bridge
    SerialApp = 64,
    /// Store and forward
    StoreForwardApp = 65,
    /// Range test
    RangeTestApp = 66,
    /// Telemetry
    TelemetryApp = 67,
    /// Zero position system
    ZpsApp = 68,
    /// Simulator
    SimulatorApp = 69,
    /// Traceroute
    TracerouteApp = 70,
    /// Neighbor info
    NeighborinfoApp = 71,
    /// ATAK plugin
    AtakPlugin = 72,
    /// Map report
    MapReportApp = 73,
    /// Start of the private application range
    PrivateApp = 256,
    /// ATAK forwarder
    AtakForwarder = 257,
    /// Highest valid port number
    Max = 511,
}

/// Application payload carried by a mesh packet
#[derive(Clone, PartialEq, Message)]
pub struct Data {
    /// Target application
    #[prost(enumeration = "PortNum", tag = "1")]
    pub portnum: i32,
    /// Application-encoded bytes
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
    /// Sender asks the recipient to answer
    #[prost(bool, tag = "3")]
    pub want_response: bool,
    /// Final destination when relayed
    #[prost(fixed32, tag = "4")]
    pub dest: u32,
    /// Original source when relayed
    #[prost(fixed32, tag = "5")]
    pub source: u32,
    /// Packet this one is a response to
    #[prost(fixed32, tag = "6")]
    pub request_id: u32,
    /// Packet this one replies to
    #[prost(fixed32, tag = "7")]
    pub reply_id: u32,
    /// Non-zero when the payload is an emoji reaction
    #[prost(fixed32, tag = "8")]
    pub emoji: u32,
}

impl Data {
    /// Target application, or `None` for port numbers this client does not know
    pub fn port(&self) -> Option<PortNum> {
        PortNum::try_from(self.portnum).ok()
    }
}

/// A mesh-addressed packet
#[derive(Clone, PartialEq, Message)]
pub struct MeshPacket {
    /// Sending node number
    #[prost(fixed32, tag = "1")]
    pub from: u32,
    /// Destination node number, or [`BROADCAST_ADDR`]
    #[prost(fixed32, tag = "2")]
    pub to: u32,
    /// Channel index (outbound) or channel hash (inbound)
    #[prost(uint32, tag = "3")]
    pub channel: u32,
    /// Packet identifier, unique per sender over a short window
    #[prost(fixed32, tag = "6")]
    pub id: u32,
    /// Receive timestamp in seconds
    #[prost(fixed32, tag = "7")]
    pub rx_time: u32,
    /// Receive SNR in dB
    #[prost(float, tag = "8")]
    pub rx_snr: f32,
    /// Remaining hops
    #[prost(uint32, tag = "9")]
    pub hop_limit: u32,
    /// Sender requests an acknowledgement
    #[prost(bool, tag = "10")]
    pub want_ack: bool,
    /// Receive RSSI in dBm
    #[prost(int32, tag = "12")]
    pub rx_rssi: i32,
    /// Packet arrived through an MQTT bridge
    #[prost(bool, tag = "14")]
    pub via_mqtt: bool,
    /// Hop limit the packet started with
    #[prost(uint32, tag = "15")]
    pub hop_start: u32,
    /// Decoded or still encrypted payload
    #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
    pub payload_variant: Option<mesh_packet::PayloadVariant>,
}

/// Nested types for [`MeshPacket`]
pub mod mesh_packet {
    /// Packet payload
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Plaintext application data
        #[prost(message, tag = "4")]
        Decoded(super::Data),
        /// Channel-encrypted application data
        #[prost(bytes, tag = "5")]
        Encrypted(Vec<u8>),
    }
}

impl MeshPacket {
    /// Plaintext payload, if the packet carries one
    pub fn decoded(&self) -> Option<&Data> {
        match &self.payload_variant {
            Some(mesh_packet::PayloadVariant::Decoded(data)) => Some(data),
            _ => None,
        }
    }

    /// Ciphertext, if the packet is still encrypted
    pub fn encrypted(&self) -> Option<&[u8]> {
        match &self.payload_variant {
            Some(mesh_packet::PayloadVariant::Encrypted(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Whether the packet is addressed to every node
    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST_ADDR
    }
}

/// Information about the node the client is attached to
#[derive(Clone, PartialEq, Message)]
pub struct MyNodeInfo {
    /// Our node number
    #[prost(uint32, tag = "1")]
    pub my_node_num: u32,
    /// Number of reboots since flashing
    #[prost(uint32, tag = "8")]
    pub reboot_count: u32,
    /// Minimum client application version the firmware accepts
    #[prost(uint32, tag = "11")]
    pub min_app_version: u32,
}

/// Identity a node broadcasts about its operator
#[derive(Clone, PartialEq, Message)]
pub struct User {
    /// Globally unique user id, e.g. `!a1b2c3d4`
    #[prost(string, tag = "1")]
    pub id: String,
    /// Full display name
    #[prost(string, tag = "2")]
    pub long_name: String,
    /// Up to four character display name
    #[prost(string, tag = "3")]
    pub short_name: String,
    /// Hardware model code
    #[prost(int32, tag = "5")]
    pub hw_model: i32,
    /// Licensed amateur radio operator
    #[prost(bool, tag = "6")]
    pub is_licensed: bool,
    /// Device role code
    #[prost(int32, tag = "7")]
    pub role: i32,
    /// Public key for direct messages
    #[prost(bytes = "vec", tag = "8")]
    pub public_key: Vec<u8>,
}

/// Last known position of a node
#[derive(Clone, PartialEq, Message)]
pub struct Position {
    /// Latitude in 1e-7 degrees
    #[prost(sfixed32, optional, tag = "1")]
    pub latitude_i: Option<i32>,
    /// Longitude in 1e-7 degrees
    #[prost(sfixed32, optional, tag = "2")]
    pub longitude_i: Option<i32>,
    /// Altitude in meters above MSL
    #[prost(int32, optional, tag = "3")]
    pub altitude: Option<i32>,
    /// Fix timestamp in seconds
    #[prost(fixed32, tag = "4")]
    pub time: u32,
}

/// Entry of the device node database
#[derive(Clone, PartialEq, Message)]
pub struct NodeInfo {
    /// Node number
    #[prost(uint32, tag = "1")]
    pub num: u32,
    /// Operator identity
    #[prost(message, optional, tag = "2")]
    pub user: Option<User>,
    /// Last known position
    #[prost(message, optional, tag = "3")]
    pub position: Option<Position>,
    /// SNR of the last packet heard from this node
    #[prost(float, tag = "4")]
    pub snr: f32,
    /// Last time the node was heard, in seconds
    #[prost(fixed32, tag = "5")]
    pub last_heard: u32,
    /// Channel the node was heard on
    #[prost(uint32, tag = "7")]
    pub channel: u32,
    /// Heard through an MQTT bridge
    #[prost(bool, tag = "8")]
    pub via_mqtt: bool,
    /// Hops between us and this node
    #[prost(uint32, optional, tag = "9")]
    pub hops_away: Option<u32>,
    /// Marked as favorite on the device
    #[prost(bool, tag = "10")]
    pub is_favorite: bool,
}

/// Radio channel configuration
#[derive(Clone, PartialEq, Message)]
pub struct ChannelSettings {
    /// Legacy channel number
    #[prost(uint32, tag = "1")]
    pub channel_num: u32,
    /// Pre-shared key, or a one byte default key index
    #[prost(bytes = "vec", tag = "2")]
    pub psk: Vec<u8>,
    /// Channel name, empty for the preset default
    #[prost(string, tag = "3")]
    pub name: String,
    /// Channel id
    #[prost(fixed32, tag = "4")]
    pub id: u32,
    /// Forward mesh traffic to MQTT
    #[prost(bool, tag = "5")]
    pub uplink_enabled: bool,
    /// Forward MQTT traffic to the mesh
    #[prost(bool, tag = "6")]
    pub downlink_enabled: bool,
}

/// One slot of the device channel table
#[derive(Clone, PartialEq, Message)]
pub struct Channel {
    /// Slot index
    #[prost(int32, tag = "1")]
    pub index: i32,
    /// Channel settings
    #[prost(message, optional, tag = "2")]
    pub settings: Option<ChannelSettings>,
    /// Slot role
    #[prost(enumeration = "channel::Role", tag = "3")]
    pub role: i32,
}

/// Nested types for [`Channel`]
pub mod channel {
    /// Role of a channel slot
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Role {
        /// Slot unused
        Disabled = 0,
        /// The channel used for broadcasts by default
        Primary = 1,
        /// Additional channel
        Secondary = 2,
    }
}

impl Channel {
    /// Slot role, treating unknown values as disabled
    pub fn channel_role(&self) -> channel::Role {
        channel::Role::try_from(self.role).unwrap_or(channel::Role::Disabled)
    }

    /// Channel name, or an empty string when unset
    pub fn name(&self) -> &str {
        self.settings.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }
}

/// Firmware and hardware capabilities
#[derive(Clone, PartialEq, Message)]
pub struct DeviceMetadata {
    /// Firmware version string
    #[prost(string, tag = "1")]
    pub firmware_version: String,
    /// Device state schema version
    #[prost(uint32, tag = "2")]
    pub device_state_version: u32,
    /// Device supports software shutdown
    #[prost(bool, tag = "3")]
    pub can_shutdown: bool,
    /// Device has WiFi
    #[prost(bool, tag = "4")]
    pub has_wifi: bool,
    /// Device has Bluetooth
    #[prost(bool, tag = "5")]
    pub has_bluetooth: bool,
    /// Device has Ethernet
    #[prost(bool, tag = "6")]
    pub has_ethernet: bool,
    /// Device role code
    #[prost(int32, tag = "7")]
    pub role: i32,
    /// Position field flags
    #[prost(uint32, tag = "8")]
    pub position_flags: u32,
    /// Hardware model code
    #[prost(int32, tag = "9")]
    pub hw_model: i32,
    /// Remote hardware module available
    #[prost(bool, tag = "10")]
    pub has_remote_hardware: bool,
}

/// Firmware debug log line
#[derive(Clone, PartialEq, Message)]
pub struct LogRecord {
    /// Log text
    #[prost(string, tag = "1")]
    pub message: String,
    /// Timestamp in seconds
    #[prost(fixed32, tag = "2")]
    pub time: u32,
    /// Emitting firmware module
    #[prost(string, tag = "3")]
    pub source: String,
    /// Log level code
    #[prost(int32, tag = "4")]
    pub level: i32,
}

/// Message from the client to the radio
#[derive(Clone, PartialEq, Message)]
pub struct ToRadio {
    /// Request kind
    #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3, 4")]
    pub payload_variant: Option<to_radio::PayloadVariant>,
}

/// Nested types for [`ToRadio`]
pub mod to_radio {
    /// Request kind
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Send a packet to the mesh
        #[prost(message, tag = "1")]
        Packet(super::MeshPacket),
        /// Ask for the full device state, tagged with a correlation id
        #[prost(uint32, tag = "3")]
        WantConfigId(u32),
        /// Tell the radio the client is going away
        #[prost(bool, tag = "4")]
        Disconnect(bool),
    }
}

impl ToRadio {
    /// Wrap a mesh packet for sending
    pub fn packet(packet: MeshPacket) -> Self {
        Self {
            payload_variant: Some(to_radio::PayloadVariant::Packet(packet)),
        }
    }

    /// Configuration request with correlation id
    pub fn want_config(id: u32) -> Self {
        Self {
            payload_variant: Some(to_radio::PayloadVariant::WantConfigId(id)),
        }
    }

    /// Disconnect notice
    pub fn disconnect() -> Self {
        Self {
            payload_variant: Some(to_radio::PayloadVariant::Disconnect(true)),
        }
    }
}

/// Message from the radio to the client
#[derive(Clone, PartialEq, Message)]
pub struct FromRadio {
    /// Monotonic message counter assigned by the firmware
    #[prost(uint32, tag = "1")]
    pub id: u32,
    /// Message kind; `None` for kinds this client does not model
    #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 4, 6, 7, 8, 10, 13")]
    pub payload_variant: Option<from_radio::PayloadVariant>,
}

/// Nested types for [`FromRadio`]
pub mod from_radio {
    /// Message kind
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PayloadVariant {
        /// Packet received from the mesh
        #[prost(message, tag = "2")]
        Packet(super::MeshPacket),
        /// Identity of the attached node
        #[prost(message, tag = "3")]
        MyInfo(super::MyNodeInfo),
        /// Node database entry
        #[prost(message, tag = "4")]
        NodeInfo(super::NodeInfo),
        /// Firmware log line
        #[prost(message, tag = "6")]
        LogRecord(super::LogRecord),
        /// End of a configuration dump, echoing the request id
        #[prost(uint32, tag = "7")]
        ConfigCompleteId(u32),
        /// The radio rebooted
        #[prost(bool, tag = "8")]
        Rebooted(bool),
        /// Channel table entry
        #[prost(message, tag = "10")]
        Channel(super::Channel),
        /// Firmware metadata
        #[prost(message, tag = "13")]
        Metadata(super::DeviceMetadata),
    }
}

impl FromRadio {
    /// Build a message around a payload variant
    pub fn new(variant: from_radio::PayloadVariant) -> Self {
        Self {
            id: 0,
            payload_variant: Some(variant),
        }
    }

    /// Mesh packet, if this message carries one
    pub fn into_packet(self) -> Option<MeshPacket> {
        match self.payload_variant {
            Some(from_radio::PayloadVariant::Packet(packet)) => Some(packet),
            _ => None,
        }
    }

    /// Short name of the payload variant, for logging
    pub fn kind(&self) -> &'static str {
        use from_radio::PayloadVariant::*;
        match &self.payload_variant {
            Some(Packet(_)) => "packet",
            Some(MyInfo(_)) => "my_info",
            Some(NodeInfo(_)) => "node_info",
            Some(LogRecord(_)) => "log_record",
            Some(ConfigCompleteId(_)) => "config_complete",
            Some(Rebooted(_)) => "rebooted",
            Some(Channel(_)) => "channel",
            Some(Metadata(_)) => "metadata",
            None => "unknown",
        }
    }
}
