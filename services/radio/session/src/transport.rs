//! Transport capabilities for talking to a radio.
//!
//! Two layers exist. A [`HardwareTransport`] exchanges raw envelopes with the
//! radio firmware; a [`MeshTransport`] exchanges mesh packets with the rest of
//! the network. The device session turns the former into the latter.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use radio_wire::{FromRadio, MeshPacket, ToRadio};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::stream::StreamTransport;

/// Port the firmware serves the stream API on
pub const DEFAULT_TCP_PORT: u16 = 4403;

/// Envelope-level link to the radio hardware
#[async_trait]
pub trait HardwareTransport: Send + Sync {
    /// Send one request to the radio
    async fn send_to_radio(&self, msg: ToRadio) -> Result<()>;

    /// Wait for the next message from the radio.
    ///
    /// Returns [`SessionError::Cancelled`] once `cancel` fires while nothing
    /// is ready; no partially received message is consumed.
    async fn receive_from_radio(&self, cancel: &CancellationToken) -> Result<FromRadio>;
}

/// Packet-level link to the mesh
#[async_trait]
pub trait MeshTransport: Send + Sync {
    /// Send one packet into the mesh
    async fn send_to_mesh(&self, packet: MeshPacket) -> Result<()>;

    /// Wait for the next packet from the mesh
    async fn receive_from_mesh(&self, cancel: &CancellationToken) -> Result<MeshPacket>;
}

/// Hardware transports that can hand out their inbound messages as a stream
pub trait StreamingTransport: HardwareTransport {
    /// Lazy stream of inbound messages.
    ///
    /// Decode errors are yielded and the stream goes on. A transport failure
    /// is yielded once and ends the stream. Cancellation ends it silently.
    /// The stream cannot be restarted; call again for a fresh one.
    fn receive_stream<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<FromRadio>> {
        stream::unfold(Some((self, cancel)), |state| async move {
            let (transport, cancel) = state?;
            match transport.receive_from_radio(cancel).await {
                Ok(msg) => Some((Ok(msg), Some((transport, cancel)))),
                Err(SessionError::Cancelled) => {
                    debug!(component = "stream", "Receive stream cancelled");
                    None
                }
                Err(e) if e.is_terminal() => Some((Err(e), None)),
                Err(e) => Some((Err(e), Some((transport, cancel)))),
            }
        })
        .boxed()
    }
}

impl<T: HardwareTransport + ?Sized> StreamingTransport for T {}

/// Connect to a radio serving the stream API over TCP.
///
/// `addr` is `host` or `host:port`; the port defaults to [`DEFAULT_TCP_PORT`].
pub async fn connect_tcp(addr: &str) -> Result<StreamTransport<TcpStream>> {
    let target = with_default_port(addr);
    let socket = TcpStream::connect(&target).await?;
    socket.set_nodelay(true)?;
    debug!(component = "stream", peer = %target, "Connected to radio");
    Ok(StreamTransport::new(socket))
}

/// Connect to the radio named by a device URL.
///
/// `tcp://host[:port]` and a bare `host[:port]` are served here. Serial, BLE,
/// HTTP and MQTT links need their own adapters and are reported as
/// [`SessionError::Unsupported`].
pub async fn connect_url(url: &str) -> Result<Arc<dyn HardwareTransport>> {
    let address = match url.split_once("://") {
        None => url,
        Some(("tcp", rest)) => rest,
        Some(("serial", _)) => return Err(SessionError::Unsupported("serial links")),
        Some(("ble", _)) => return Err(SessionError::Unsupported("BLE links")),
        Some(("http" | "https", _)) => return Err(SessionError::Unsupported("HTTP links")),
        Some(("mqtt" | "mqtts", _)) => return Err(SessionError::Unsupported("MQTT links")),
        Some(_) => return Err(SessionError::Unsupported("unknown device URL scheme")),
    };

    let transport = connect_tcp(address.trim_end_matches('/')).await?;
    Ok(Arc::new(transport))
}

fn with_default_port(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    match addr.matches(':').count() {
        0 => format!("{}:{}", addr, DEFAULT_TCP_PORT),
        1 => addr.to_string(),
        // bare IPv6 literal
        _ => format!("[{}]:{}", addr, DEFAULT_TCP_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio_wire::proto::from_radio::PayloadVariant;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of receive results
    struct Replay {
        results: Mutex<VecDeque<Result<FromRadio>>>,
    }

    impl Replay {
        fn new(results: Vec<Result<FromRadio>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
            }
        }
    }

    #[async_trait]
    impl HardwareTransport for Replay {
        async fn send_to_radio(&self, _msg: ToRadio) -> Result<()> {
            Ok(())
        }

        async fn receive_from_radio(&self, cancel: &CancellationToken) -> Result<FromRadio> {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SessionError::Closed))
        }
    }

    fn rebooted() -> FromRadio {
        FromRadio::new(PayloadVariant::Rebooted(true))
    }

    fn decode_error() -> SessionError {
        radio_wire::decode_from_radio(&[0x12, 0x10, 0x01])
            .unwrap_err()
            .into()
    }

    #[tokio::test]
    async fn test_stream_continues_after_decode_error() {
        let transport = Replay::new(vec![
            Ok(rebooted()),
            Err(decode_error()),
            Ok(rebooted()),
            Err(SessionError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))),
            Ok(rebooted()),
        ]);
        let cancel = CancellationToken::new();

        let items: Vec<_> = transport.receive_stream(&cancel).collect().await;
        assert_eq!(items.len(), 4);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(SessionError::Decode(_))));
        assert!(items[2].is_ok());
        assert!(matches!(items[3], Err(SessionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_stream_ends_on_cancel() {
        let transport = Replay::new(vec![Ok(rebooted())]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let items: Vec<_> = transport.receive_stream(&cancel).collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_stream_through_trait_object() {
        let transport: Arc<dyn HardwareTransport> = Arc::new(Replay::new(vec![Ok(rebooted())]));
        let cancel = CancellationToken::new();

        let items: Vec<_> = transport.receive_stream(&cancel).collect().await;
        // the message, then the closed error that ends the stream
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(SessionError::Closed)));
    }

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("radio.local"), "radio.local:4403");
        assert_eq!(with_default_port("10.0.0.5:4000"), "10.0.0.5:4000");
        assert_eq!(with_default_port("[::1]:4403"), "[::1]:4403");
        assert_eq!(with_default_port("fe80::1"), "[fe80::1]:4403");
    }

    #[tokio::test]
    async fn test_connect_url_schemes() {
        let urls = [
            "serial:///dev/ttyUSB0",
            "ble://AA:BB",
            "http://meshtastic.local",
            "mqtt://broker",
            "gopher://x",
        ];
        for url in urls {
            match connect_url(url).await {
                Err(SessionError::Unsupported(_)) => {}
                Err(other) => panic!("{}: unexpected error {:?}", url, other),
                Ok(_) => panic!("{}: unexpectedly connected", url),
            }
        }
    }

    #[tokio::test]
    async fn test_connect_url_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let transport = connect_url(&format!("tcp://{}/", addr)).await.unwrap();
        let (mut socket, _) = listener.accept().await.unwrap();

        transport.send_to_radio(ToRadio::want_config(3)).await.unwrap();
        let mut buf = [0u8; 4];
        tokio::io::AsyncReadExt::read_exact(&mut socket, &mut buf).await.unwrap();
        assert_eq!(&buf[..2], &radio_wire::FRAME_MAGIC);
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect_tcp(&addr.to_string()).await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }
}
