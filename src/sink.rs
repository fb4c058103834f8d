//! Downstream batch/block consumers.
//!
//! The abstract `Sink`/`StreamSink` boundary mirrors `sn2daemon/sink.py`'s
//! `Sink` ABC; `ChannelSink` and `PubSubSink` are concrete stand-ins for
//! its `MetricCollectorSink` and `PubSubSink`, the latter generic over a
//! `PubSubPublisher` trait instead of a concrete `aioxmpp` client (out of
//! scope here) so the node-prefix-concatenation and conflict-as-success
//! semantics still have somewhere to live.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::buffer::{BlockHandle, StreamBlock};
use crate::sensor_path::{BarePath, SampleBatch};

/// Non-blocking batch consumer. Implementations must never block the
/// caller; a bounded implementation drops its oldest entry to admit a
/// new one rather than refuse it.
pub trait Sink: Send + Sync {
    fn submit_batch(&self, batch: SampleBatch);

    fn submit_batches(&self, batches: Vec<SampleBatch>) {
        for batch in batches {
            self.submit_batch(batch);
        }
    }
}

/// Non-blocking stream block consumer. `handle.close()` is the
/// producer's signal that the block's backing resource may be released;
/// implementations should call it once the block is durably accepted.
pub trait StreamSink: Send + Sync {
    fn submit_block(&self, block: StreamBlock, handle: BlockHandle);
}

/// Forwards batches to an in-process consumer through a bounded,
/// drop-oldest queue. `tokio::sync::mpsc::Sender` has no producer-side
/// eviction primitive, so the bounded/drop-oldest contract is realized
/// with a mutex-guarded ring buffer plus a `Notify` instead of a literal
/// `mpsc` channel; `ChannelSinkReceiver::recv` presents the same
/// "await the next batch" shape a channel receiver would.
pub struct ChannelSink {
    queue: Arc<Mutex<VecDeque<SampleBatch>>>,
    capacity: usize,
    notify: Arc<Notify>,
}

pub struct ChannelSinkReceiver {
    queue: Arc<Mutex<VecDeque<SampleBatch>>>,
    notify: Arc<Notify>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, ChannelSinkReceiver) {
        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let notify = Arc::new(Notify::new());
        (
            Self { queue: queue.clone(), capacity, notify: notify.clone() },
            ChannelSinkReceiver { queue, notify },
        )
    }
}

impl Sink for ChannelSink {
    fn submit_batch(&self, batch: SampleBatch) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                log::warn!("channel sink queue full, dropping batch for {}", dropped.bare_path);
            }
        }
        queue.push_back(batch);
        drop(queue);
        self.notify.notify_one();
    }
}

impl ChannelSinkReceiver {
    /// Await and drain whatever batches are currently queued.
    pub async fn recv(&self) -> Vec<SampleBatch> {
        loop {
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() {
                    return queue.drain(..).collect();
                }
            }
            self.notify.notified().await;
        }
    }
}

/// The `StreamSink` analogue of [`ChannelSink`].
pub struct ChannelStreamSink {
    queue: Arc<Mutex<VecDeque<StreamBlock>>>,
    capacity: usize,
    notify: Arc<Notify>,
}

pub struct ChannelStreamSinkReceiver {
    queue: Arc<Mutex<VecDeque<StreamBlock>>>,
    notify: Arc<Notify>,
}

impl ChannelStreamSink {
    pub fn new(capacity: usize) -> (Self, ChannelStreamSinkReceiver) {
        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
        let notify = Arc::new(Notify::new());
        (
            Self { queue: queue.clone(), capacity, notify: notify.clone() },
            ChannelStreamSinkReceiver { queue, notify },
        )
    }
}

impl StreamSink for ChannelStreamSink {
    fn submit_block(&self, block: StreamBlock, handle: BlockHandle) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            if let Some(dropped) = queue.pop_front() {
                log::warn!("channel stream sink queue full, dropping block for {}", dropped.path);
            }
        }
        queue.push_back(block);
        drop(queue);
        self.notify.notify_one();
        handle.close();
    }
}

impl ChannelStreamSinkReceiver {
    pub async fn recv(&self) -> Vec<StreamBlock> {
        loop {
            {
                let mut queue = self.queue.lock();
                if !queue.is_empty() {
                    return queue.drain(..).collect();
                }
            }
            self.notify.notified().await;
        }
    }
}

/// Minimal boundary to a pub/sub publish service, standing in for the
/// `aioxmpp.PubSubClient` the original sink drove directly.
#[async_trait]
pub trait PubSubPublisher: Send + Sync {
    type Error: std::fmt::Debug;

    /// Publish `batch` to `node`.
    async fn publish(&self, node: &str, batch: &SampleBatch) -> Result<(), Self::Error>;

    /// Create `node` if it does not already exist. Implementations
    /// should treat "already exists" as success, matching the original
    /// sink's CONFLICT-is-success handling.
    async fn create_node(&self, node: &str) -> Result<(), Self::Error>;
}

/// Publishes each batch to a node named by concatenating
/// [`PubSubSink::node_prefix`] with the batch's [`BarePath`], retrying
/// node creation at most once per node per process lifetime.
pub struct PubSubSink<P: PubSubPublisher> {
    publisher: P,
    node_prefix: String,
    configured_nodes: Mutex<std::collections::HashSet<String>>,
}

impl<P: PubSubPublisher> PubSubSink<P> {
    pub fn new(publisher: P, node_prefix: impl Into<String>) -> Self {
        Self { publisher, node_prefix: node_prefix.into(), configured_nodes: Mutex::new(Default::default()) }
    }

    fn node_for(&self, bare_path: &BarePath) -> String {
        format!("{}{}", self.node_prefix, bare_path)
    }

    async fn ensure_node(&self, node: &str) {
        if self.configured_nodes.lock().contains(node) {
            return;
        }
        if let Err(err) = self.publisher.create_node(node).await {
            log::debug!("node {node} create failed (treated as already-configured): {err:?}");
        }
        self.configured_nodes.lock().insert(node.to_string());
    }

    /// Publish one batch, creating its node first if needed. Exposed as
    /// an async method since the trait-level `Sink::submit_batch`
    /// cannot await; callers that need async semantics should drive
    /// this directly instead of going through `Sink`.
    pub async fn publish_batch(&self, batch: SampleBatch) -> Result<(), P::Error> {
        let node = self.node_for(&batch.bare_path);
        self.ensure_node(&node).await;
        self.publisher.publish(&node, &batch).await
    }

    /// Deduplicate `batches` to the most recent batch per sensor path
    /// before publishing, matching the original sink's
    /// `submit_batches` collapsing behaviour.
    pub async fn publish_batches(&self, batches: Vec<SampleBatch>) {
        let mut most_recent: HashMap<BarePath, SampleBatch> = HashMap::new();
        for batch in batches {
            match most_recent.get(&batch.bare_path) {
                Some(current) if current.timestamp >= batch.timestamp => {}
                _ => {
                    most_recent.insert(batch.bare_path.clone(), batch);
                }
            }
        }
        for batch in most_recent.into_values() {
            if let Err(err) = self.publish_batch(batch).await {
                log::warn!("pub/sub publish failed: {err:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_path::{Instance, Part, RtcInstant};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch(path: &str, ts: u32) -> SampleBatch {
        SampleBatch {
            timestamp: RtcInstant::from_epoch_seconds(ts),
            bare_path: BarePath { part: Part::Ds18b20, instance: Instance::Hex(path.to_string()) },
            samples: vec![(None, 1.0)],
        }
    }

    #[test]
    fn channel_sink_drops_oldest_on_overflow() {
        let (sink, receiver) = ChannelSink::new(2);
        sink.submit_batch(batch("a", 0));
        sink.submit_batch(batch("b", 1));
        sink.submit_batch(batch("c", 2));

        let drained = futures_block_on(receiver.recv());
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp, RtcInstant::from_epoch_seconds(1));
        assert_eq!(drained[1].timestamp, RtcInstant::from_epoch_seconds(2));
    }

    struct CountingPublisher {
        publishes: AtomicUsize,
        creates: AtomicUsize,
    }

    #[async_trait]
    impl PubSubPublisher for CountingPublisher {
        type Error = std::convert::Infallible;

        async fn publish(&self, _node: &str, _batch: &SampleBatch) -> Result<(), Self::Error> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create_node(&self, _node: &str) -> Result<(), Self::Error> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn pubsub_sink_creates_node_once() {
        let sink = PubSubSink::new(CountingPublisher { publishes: AtomicUsize::new(0), creates: AtomicUsize::new(0) }, "prefix#");
        sink.publish_batch(batch("a", 0)).await.unwrap();
        sink.publish_batch(batch("a", 1)).await.unwrap();

        assert_eq!(sink.publisher.creates.load(Ordering::SeqCst), 1);
        assert_eq!(sink.publisher.publishes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pubsub_sink_dedups_to_most_recent_per_path() {
        let sink = PubSubSink::new(CountingPublisher { publishes: AtomicUsize::new(0), creates: AtomicUsize::new(0) }, "prefix#");
        sink.publish_batches(vec![batch("a", 0), batch("a", 5), batch("b", 1)]).await;
        assert_eq!(sink.publisher.publishes.load(Ordering::SeqCst), 2);
    }

    fn futures_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(fut)
    }
}
