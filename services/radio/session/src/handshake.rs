//! Configuration handshake with the radio.
//!
//! On connect the client asks the firmware for its full state with a
//! `WantConfigId` request. The radio answers with a burst of identity, node
//! database, channel and metadata messages and closes the burst with a
//! `ConfigCompleteId` echoing the request id.
//!
//! The same link also carries unrelated traffic, and a second client may be
//! running its own handshake. Every request is registered in a
//! [`PendingRequests`] table so completions can be matched explicitly.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use radio_wire::proto::{channel, from_radio::PayloadVariant};
use radio_wire::{Channel, DeviceMetadata, MyNodeInfo, NodeInfo, ToRadio};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, Instrument, Span};

use crate::error::Result;
use crate::transport::HardwareTransport;

/// Config ids the firmware gives special meaning and that must not be used
pub const RESERVED_CONFIG_IDS: [u32; 2] = [69420, 69421];

/// Request ids currently waiting for a response on one transport
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: DashMap<u32, Instant>,
}

/// Registration in a [`PendingRequests`] table, removed on drop
#[derive(Debug)]
pub struct PendingGuard {
    table: Arc<PendingRequests>,
    id: u32,
}

impl PendingRequests {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`, or return `None` if it is already pending
    pub fn register(self: &Arc<Self>, id: u32) -> Option<PendingGuard> {
        match self.requests.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Some(PendingGuard {
                    table: self.clone(),
                    id,
                })
            }
        }
    }

    /// Whether `id` is waiting for a response
    pub fn contains(&self, id: u32) -> bool {
        self.requests.contains_key(&id)
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl PendingGuard {
    /// The registered request id
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some((_, started)) = self.table.requests.remove(&self.id) {
            trace!(
                component = "config",
                config_id = self.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request no longer pending"
            );
        }
    }
}

/// Device state gathered by one configuration handshake
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    /// Identity of the attached node
    pub my_info: Option<MyNodeInfo>,
    /// Node database, in the order received
    pub nodes: Vec<NodeInfo>,
    /// Channel table, in the order received
    pub channels: Vec<Channel>,
    /// Firmware metadata
    pub metadata: Option<DeviceMetadata>,
}

impl DeviceState {
    /// Node database entry of the attached node
    pub fn current_node_info(&self) -> Option<&NodeInfo> {
        let me = self.my_info.as_ref()?.my_node_num;
        self.node(me)
    }

    /// Node database entry for `num`
    pub fn node(&self, num: u32) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.num == num)
    }

    /// The primary channel, if the table has one
    pub fn primary_channel(&self) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.channel_role() == channel::Role::Primary)
    }
}

/// Runs configuration handshakes over a hardware transport
pub struct ConfigSync {
    transport: Arc<dyn HardwareTransport>,
    pending: Arc<PendingRequests>,
    span: Span,
}

impl ConfigSync {
    /// Handshake runner with its own pending table.
    ///
    /// Runners on the same transport should share one table through
    /// [`ConfigSync::with_pending`]; otherwise each treats the other's
    /// completions as stale.
    pub fn new(transport: Arc<dyn HardwareTransport>) -> Self {
        Self {
            transport,
            pending: Arc::new(PendingRequests::new()),
            span: tracing::debug_span!("config_sync"),
        }
    }

    /// Share a pending table with other users of the same transport
    pub fn with_pending(mut self, pending: Arc<PendingRequests>) -> Self {
        self.pending = pending;
        self
    }

    /// Use a caller-provided span for this runner's log events
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Requests currently in flight on this transport
    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    /// Request and collect the full device state.
    ///
    /// There is no built-in timeout: the call runs until the matching
    /// completion arrives, the transport fails, or `cancel` fires.
    pub async fn get_state(&self, cancel: &CancellationToken) -> Result<DeviceState> {
        self.run(cancel).instrument(self.span.clone()).await
    }

    fn reserve_id(&self) -> PendingGuard {
        loop {
            let id: u32 = rand::random();
            if id == 0 || RESERVED_CONFIG_IDS.contains(&id) {
                continue;
            }
            if let Some(guard) = self.pending.register(id) {
                return guard;
            }
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<DeviceState> {
        let guard = self.reserve_id();
        let id = guard.id();
        let started = Instant::now();

        debug!(component = "config", config_id = id, "Requesting device configuration");
        self.transport.send_to_radio(ToRadio::want_config(id)).await?;

        let mut state = DeviceState::default();
        loop {
            let msg = self.transport.receive_from_radio(cancel).await?;
            let kind = msg.kind();

            match msg.payload_variant {
                Some(PayloadVariant::MyInfo(my_info)) => {
                    trace!(component = "config", node = my_info.my_node_num, "Identity received");
                    state.my_info = Some(my_info);
                }
                Some(PayloadVariant::NodeInfo(node)) => state.nodes.push(node),
                Some(PayloadVariant::Channel(channel)) => state.channels.push(channel),
                Some(PayloadVariant::Metadata(metadata)) => state.metadata = Some(metadata),
                Some(PayloadVariant::ConfigCompleteId(done)) if done == id => {
                    info!(
                        component = "config",
                        config_id = id,
                        nodes = state.nodes.len(),
                        channels = state.channels.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Device configuration received"
                    );
                    return Ok(state);
                }
                Some(PayloadVariant::ConfigCompleteId(other)) => {
                    if self.pending.contains(other) {
                        debug!(
                            component = "config",
                            config_id = id,
                            other,
                            "Completion belongs to another pending request"
                        );
                    } else {
                        debug!(
                            component = "config",
                            config_id = id,
                            other,
                            "Ignoring stale configuration completion"
                        );
                    }
                }
                _ => trace!(component = "config", kind, "Ignoring message during handshake"),
            }
        }
    }
}
