//! In-memory radio used by the unit tests.

use std::sync::Arc;

use radio_wire::proto::to_radio;
use radio_wire::{FromRadio, ToRadio};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::push::{PushHandle, PushTransport};

/// Simulated radio answering client requests from a script
pub(crate) struct FakeRadio {
    pub handle: Arc<PushHandle>,
    pub sent: mpsc::UnboundedReceiver<ToRadio>,
    task: JoinHandle<()>,
}

impl FakeRadio {
    /// Start a radio that answers each `WantConfigId` with `script(id)`.
    ///
    /// Every envelope the client sends is also forwarded to `sent`.
    pub fn spawn<F>(script: F) -> (PushTransport, FakeRadio)
    where
        F: Fn(u32) -> Vec<FromRadio> + Send + 'static,
    {
        let (transport, handle) = PushTransport::new(256);
        let handle = Arc::new(handle);
        let (sent_tx, sent) = mpsc::unbounded_channel();

        let link = handle.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = link.next_outbound().await {
                if let Some(to_radio::PayloadVariant::WantConfigId(id)) = &msg.payload_variant {
                    for reply in script(*id) {
                        link.push(reply);
                    }
                }
                let _ = sent_tx.send(msg);
            }
        });

        (transport, FakeRadio { handle, sent, task })
    }

    /// A radio that never answers configuration requests
    pub fn silent() -> (PushTransport, FakeRadio) {
        Self::spawn(|_| Vec::new())
    }
}

impl Drop for FakeRadio {
    fn drop(&mut self) {
        self.task.abort();
    }
}
