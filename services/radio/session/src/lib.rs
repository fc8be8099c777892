//! Radio transports, device session, configuration handshake, and fan-out.
//!
//! This crate turns a link to a radio into a mesh endpoint. Links come in two
//! shapes: byte streams (TCP, serial) handled by [`StreamTransport`], and
//! push-style callbacks (BLE notifications, broker subscriptions) handled by
//! [`PushTransport`]. Both implement [`HardwareTransport`]; a [`Device`]
//! layered on top implements [`MeshTransport`].
//!
//! ## Features
//!
//! - **Framed streams**: resyncing frame decoder, cancel-safe reads
//! - **Config handshake**: request-id correlated device state download
//! - **Device session**: node identity and packet id assignment
//! - **Fan-out**: concurrent delivery of inbound messages to subscribers
//! - **Backpressure**: bounded drop-oldest buffering for push links
//!
//! ## Example
//!
//! ```rust,no_run
//! use radio_session::{connect_tcp, Device, FanOutPublisher, QueueSubscriber, StreamingTransport};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> radio_session::Result<()> {
//! let cancel = CancellationToken::new();
//! let transport = Arc::new(connect_tcp("192.168.1.40").await?);
//!
//! let (device, state) = Device::connect(transport.clone(), &cancel).await?;
//! println!("Connected as node {} with {} known nodes", device.node_id(), state.nodes.len());
//!
//! let texts = Arc::new(QueueSubscriber::new(120));
//! let mut publisher = FanOutPublisher::new();
//! publisher.subscribe(texts.clone());
//!
//! publisher.publish_all(transport.receive_stream(&cancel)).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod handshake;
pub mod publisher;
pub mod push;
pub mod queue;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types
pub use device::{format_node, Device, SendDataParams, DEFAULT_HOP_LIMIT};
pub use error::{Result, SessionError};
pub use handshake::{ConfigSync, DeviceState, PendingGuard, PendingRequests, RESERVED_CONFIG_IDS};
pub use publisher::{FanOutPublisher, PacketSubscriber, QueueSubscriber};
pub use push::{PushHandle, PushTransport};
pub use queue::{DropOldestQueue, DEFAULT_QUEUE_CAPACITY};
pub use stream::StreamTransport;
pub use transport::{
    connect_tcp, connect_url, HardwareTransport, MeshTransport, StreamingTransport,
    DEFAULT_TCP_PORT,
};
