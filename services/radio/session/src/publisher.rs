//! Fan-out of radio messages to subscribers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::{Stream, StreamExt};
use radio_wire::FromRadio;
use tracing::{debug, trace, warn, Instrument, Span};

use crate::error::Result;
use crate::queue::DropOldestQueue;

/// Receiver of published radio messages
#[async_trait]
pub trait PacketSubscriber: Send + Sync {
    /// Handle one message. The publisher waits for this to return.
    async fn on_packet(&self, msg: &FromRadio);
}

/// Delivers every message to all registered subscribers
pub struct FanOutPublisher {
    subscribers: Vec<Arc<dyn PacketSubscriber>>,
    span: Span,
}

impl Default for FanOutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOutPublisher {
    /// Publisher with no subscribers
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            span: tracing::debug_span!("publisher"),
        }
    }

    /// Use a caller-provided span for this publisher's log events
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register a subscriber.
    ///
    /// Takes `&mut self`, so the set cannot change while a publish is running.
    pub fn subscribe(&mut self, subscriber: Arc<dyn PacketSubscriber>) {
        self.subscribers.push(subscriber);
        debug!(
            component = "publisher",
            subscribers = self.subscribers.len(),
            "Subscriber added"
        );
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Hand `msg` to every subscriber concurrently and wait for all of them
    pub async fn publish(&self, msg: &FromRadio) {
        trace!(
            component = "publisher",
            kind = msg.kind(),
            subscribers = self.subscribers.len(),
            "Publishing"
        );
        join_all(self.subscribers.iter().map(|s| s.on_packet(msg))).await;
    }

    /// Publish every message of `stream` in arrival order.
    ///
    /// Errors are logged and skipped. Returns the number of messages
    /// published once the stream ends.
    pub async fn publish_all<S>(&self, stream: S) -> u64
    where
        S: Stream<Item = Result<FromRadio>> + Send,
    {
        async {
            let mut stream = std::pin::pin!(stream);
            let mut published = 0u64;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(msg) => {
                        self.publish(&msg).await;
                        published += 1;
                    }
                    Err(e) => warn!(component = "publisher", "Skipping failed receive: {}", e),
                }
            }

            debug!(component = "publisher", published, "Inbound stream ended");
            published
        }
        .instrument(self.span.clone())
        .await
    }
}

/// Subscriber that buffers messages in a drop-oldest queue.
///
/// Lets a slow consumer sit behind the publisher without stalling it; the
/// consumer drains [`queue`](Self::queue) at its own pace.
pub struct QueueSubscriber {
    queue: Arc<DropOldestQueue<FromRadio>>,
    filter: Option<fn(&FromRadio) -> bool>,
}

impl QueueSubscriber {
    /// Buffer up to `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(DropOldestQueue::new(capacity)),
            filter: None,
        }
    }

    /// Only buffer messages accepted by `filter`
    pub fn with_filter(mut self, filter: fn(&FromRadio) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The buffer consumers read from
    pub fn queue(&self) -> Arc<DropOldestQueue<FromRadio>> {
        self.queue.clone()
    }
}

#[async_trait]
impl PacketSubscriber for QueueSubscriber {
    async fn on_packet(&self, msg: &FromRadio) {
        if self.filter.map_or(true, |accept| accept(msg)) {
            self.queue.push(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use radio_wire::proto::from_radio::PayloadVariant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PacketSubscriber for Recorder {
        async fn on_packet(&self, msg: &FromRadio) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().unwrap().push(msg.id);
        }
    }

    fn msg(id: u32) -> FromRadio {
        FromRadio {
            id,
            payload_variant: Some(PayloadVariant::Rebooted(false)),
        }
    }

    #[tokio::test]
    async fn test_publish_waits_for_slow_subscriber() {
        let fast_a = Arc::new(Recorder::default());
        let fast_b = Arc::new(Recorder::default());
        let slow = Arc::new(Recorder {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });

        let mut publisher = FanOutPublisher::new();
        publisher.subscribe(fast_a.clone());
        publisher.subscribe(slow.clone());
        publisher.subscribe(fast_b.clone());
        assert_eq!(publisher.subscriber_count(), 3);

        publisher.publish(&msg(1)).await;

        for recorder in [&fast_a, &slow, &fast_b] {
            assert_eq!(*recorder.seen.lock().unwrap(), vec![1]);
        }
    }

    #[tokio::test]
    async fn test_subscribers_run_concurrently() {
        struct Counting(AtomicUsize);

        #[async_trait]
        impl PacketSubscriber for Counting {
            async fn on_packet(&self, _msg: &FromRadio) {
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut publisher = FanOutPublisher::new();
        let counters: Vec<_> = (0..3).map(|_| Arc::new(Counting(AtomicUsize::new(0)))).collect();
        for counter in &counters {
            publisher.subscribe(counter.clone());
        }

        let started = tokio::time::Instant::now();
        publisher.publish(&msg(1)).await;
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(counters.iter().all(|c| c.0.load(Ordering::SeqCst) == 1));
    }

    #[tokio::test]
    async fn test_publish_all_skips_errors_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut publisher = FanOutPublisher::new();
        publisher.subscribe(recorder.clone());

        let items: Vec<Result<FromRadio>> = vec![
            Ok(msg(1)),
            Err(SessionError::InvalidFormat),
            Ok(msg(2)),
            Ok(msg(3)),
        ];
        let published = publisher.publish_all(futures::stream::iter(items)).await;

        assert_eq!(published, 3);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = FanOutPublisher::default();
        publisher.publish(&msg(1)).await;
    }

    #[tokio::test]
    async fn test_queue_subscriber_filters_and_buffers() {
        let subscriber = Arc::new(
            QueueSubscriber::new(2).with_filter(|m| m.id % 2 == 0),
        );
        let queue = subscriber.queue();
        let mut publisher = FanOutPublisher::new();
        publisher.subscribe(subscriber);

        for id in 1..=6 {
            publisher.publish(&msg(id)).await;
        }

        // 2, 4, 6 accepted; capacity 2 keeps the newest
        let cancel = CancellationToken::new();
        assert_eq!(queue.pop(&cancel).await.unwrap().id, 4);
        assert_eq!(queue.pop(&cancel).await.unwrap().id, 6);
        assert_eq!(queue.dropped(), 1);
    }
}
