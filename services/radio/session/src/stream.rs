//! Hardware transport over a framed byte stream.
//!
//! Serial ports and TCP sockets both deliver an unstructured byte stream.
//! [`StreamTransport`] frames outgoing envelopes and runs the resyncing frame
//! decoder over incoming bytes.

use async_trait::async_trait;
use bytes::BytesMut;
use radio_wire::{
    decode_from_radio, encode_to_radio, DecoderStats, FrameDecoder, FromRadio, ToRadio,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument, Span};

use crate::error::{Result, SessionError};
use crate::transport::HardwareTransport;

const READ_CHUNK: usize = 1024;

struct ReadState<S> {
    reader: ReadHalf<S>,
    decoder: FrameDecoder,
    buffer: BytesMut,
}

/// Framed envelope transport over any async byte stream
pub struct StreamTransport<S> {
    read: Mutex<ReadState<S>>,
    write: Mutex<WriteHalf<S>>,
    span: Span,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a byte stream
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            read: Mutex::new(ReadState {
                reader,
                decoder: FrameDecoder::new(),
                buffer: BytesMut::with_capacity(READ_CHUNK),
            }),
            write: Mutex::new(writer),
            span: tracing::debug_span!("stream_transport"),
        }
    }

    /// Use a caller-provided span for this transport's log events
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Frame decoder counters
    pub async fn decoder_stats(&self) -> DecoderStats {
        self.read.lock().await.decoder.stats()
    }

    /// Shut down the write side of the stream
    pub async fn shutdown(&self) -> Result<()> {
        self.write.lock().await.shutdown().await?;
        Ok(())
    }

    async fn read_frame(&self, cancel: &CancellationToken) -> Result<FromRadio> {
        // Another reader may hold the lock indefinitely
        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            guard = self.read.lock() => guard,
        };
        let state = &mut *guard;

        loop {
            // A frame that is already buffered wins over cancellation
            if let Some(payload) = state.decoder.decode(&mut state.buffer) {
                trace!(component = "stream", len = payload.len(), "Frame received");
                return decode_from_radio(&payload).map_err(|e| {
                    debug!(component = "stream", "Dropping undecodable frame: {}", e);
                    SessionError::from(e)
                });
            }

            state.buffer.reserve(READ_CHUNK);
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                read = state.reader.read_buf(&mut state.buffer) => read?,
            };

            if read == 0 {
                warn!(
                    component = "stream",
                    buffered = state.buffer.len(),
                    "Radio closed the stream"
                );
                return Err(SessionError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed by radio",
                )));
            }
        }
    }
}

#[async_trait]
impl<S> HardwareTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send_to_radio(&self, msg: ToRadio) -> Result<()> {
        let frame = encode_to_radio(&msg)?;

        async {
            let mut writer = self.write.lock().await;
            writer.write_all(&frame).await?;
            writer.flush().await?;
            trace!(component = "stream", len = frame.len(), "Frame sent");
            Ok::<(), SessionError>(())
        }
        .instrument(self.span.clone())
        .await
    }

    async fn receive_from_radio(&self, cancel: &CancellationToken) -> Result<FromRadio> {
        self.read_frame(cancel).instrument(self.span.clone()).await
    }
}
