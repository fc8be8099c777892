//! Hardware transport for push-style links.
//!
//! Some links do not offer a byte stream to read from. BLE notifications and
//! broker subscriptions call back with whole envelopes whenever they arrive.
//! [`PushTransport`] buffers those in a [`DropOldestQueue`] so the callback
//! never blocks, and hands outgoing envelopes to the link owner through a
//! bounded channel.

use std::sync::Arc;

use async_trait::async_trait;
use radio_wire::{FromRadio, ToRadio};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::queue::DropOldestQueue;
use crate::transport::HardwareTransport;

/// Client side of a push-style link
pub struct PushTransport {
    inbound: Arc<DropOldestQueue<FromRadio>>,
    outbound: mpsc::Sender<ToRadio>,
}

/// Link side of a push-style link.
///
/// The link owner pushes envelopes received from the radio and drains the
/// envelopes the client wants to send.
pub struct PushHandle {
    inbound: Arc<DropOldestQueue<FromRadio>>,
    outbound: Mutex<mpsc::Receiver<ToRadio>>,
}

impl PushTransport {
    /// Create a connected transport and handle pair.
    ///
    /// `capacity` bounds the inbound queue; when it is full the oldest
    /// envelope is dropped.
    pub fn new(capacity: usize) -> (Self, PushHandle) {
        let inbound = Arc::new(DropOldestQueue::new(capacity));
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let transport = Self {
            inbound: inbound.clone(),
            outbound: tx,
        };
        let handle = PushHandle {
            inbound,
            outbound: Mutex::new(rx),
        };
        (transport, handle)
    }

    /// Envelopes dropped because the client fell behind
    pub fn dropped(&self) -> u64 {
        self.inbound.dropped()
    }
}

#[async_trait]
impl HardwareTransport for PushTransport {
    async fn send_to_radio(&self, msg: ToRadio) -> Result<()> {
        self.outbound.send(msg).await.map_err(|_| {
            debug!(component = "push", "Link owner went away, send rejected");
            SessionError::Closed
        })
    }

    async fn receive_from_radio(&self, cancel: &CancellationToken) -> Result<FromRadio> {
        self.inbound.pop(cancel).await
    }
}

impl PushHandle {
    /// Deliver an envelope from the radio. Never blocks.
    pub fn push(&self, msg: FromRadio) -> bool {
        trace!(component = "push", kind = msg.kind(), "Envelope pushed");
        self.inbound.push(msg)
    }

    /// Next envelope the client sent, or `None` once the client is gone
    pub async fn next_outbound(&self) -> Option<ToRadio> {
        self.outbound.lock().await.recv().await
    }

    /// Mark the link as down; the client sees [`SessionError::Closed`] after
    /// draining what is buffered.
    pub fn close(&self) {
        self.inbound.close();
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.inbound.close();
    }
}
