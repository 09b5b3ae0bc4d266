use crate::domain::delivery::{Acknowledger, Delivery, DeliveryStream, Message, QueueSpec};
use crate::domain::ports::{Broker, Connector};
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
struct Stored {
    message: Message,
    redelivered: bool,
}

#[derive(Debug)]
struct Unacked {
    stored: Stored,
    channel: u64,
}

#[derive(Debug)]
struct QueueState {
    spec: QueueSpec,
    ready: VecDeque<Stored>,
    unacked: HashMap<u64, Unacked>,
}

#[derive(Debug, Default)]
struct ChannelState {
    prefetch: Option<u16>,
    unacked: usize,
    closed: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    queues: HashMap<String, QueueState>,
    declarations: Vec<String>,
    channels: HashMap<u64, ChannelState>,
    next_channel: u64,
    next_tag: u64,
    consumer_epoch: u64,
    peak_unacked: usize,
    refuse_connections: u32,
    fail_publishes: u32,
    fail_prefetch: bool,
}

impl ServerState {
    fn channel(&self, id: u64) -> Result<&ChannelState, BrokerError> {
        match self.channels.get(&id) {
            Some(channel) if !channel.closed => Ok(channel),
            _ => Err(BrokerError::ChannelClosed),
        }
    }

    fn channel_mut(&mut self, id: u64) -> Result<&mut ChannelState, BrokerError> {
        match self.channels.get_mut(&id) {
            Some(channel) if !channel.closed => Ok(channel),
            _ => Err(BrokerError::ChannelClosed),
        }
    }

    fn total_unacked(&self) -> usize {
        self.queues.values().map(|q| q.unacked.len()).sum()
    }
}

/// A single-process broker with the queue semantics the dispatcher relies on:
/// durable FIFO queues, prefetch-bounded manual-ack consumers, dead-letter
/// routing on reject-without-requeue and redelivery of unacknowledged
/// messages when a channel closes.
///
/// Cloning shares the same server. Each [`Connector::connect`] opens a new
/// channel on it.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<ServerState>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a channel without going through [`Connector`].
    pub async fn channel(&self) -> InMemoryChannel {
        let mut state = self.state.lock().await;
        state.next_channel += 1;
        let id = state.next_channel;
        state.channels.insert(id, ChannelState::default());
        InMemoryChannel {
            id,
            server: self.clone(),
        }
    }

    /// Makes the next `count` connection attempts fail.
    pub async fn refuse_connections(&self, count: u32) {
        self.state.lock().await.refuse_connections = count;
    }

    /// Makes the next `count` publishes fail.
    pub async fn fail_publishes(&self, count: u32) {
        self.state.lock().await.fail_publishes = count;
    }

    pub async fn fail_prefetch(&self, fail: bool) {
        self.state.lock().await.fail_prefetch = fail;
    }

    /// Ends every open delivery stream, as a dropped consumer would.
    pub async fn drop_consumers(&self) {
        self.state.lock().await.consumer_epoch += 1;
        self.notify.notify_waiters();
    }

    /// Messages ready for delivery on `queue`.
    pub async fn queue_depth(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub async fn unacked_count(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map_or(0, |q| q.unacked.len())
    }

    /// Snapshot of the ready messages on `queue`, head first.
    pub async fn messages(&self, queue: &str) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|s| s.message.clone()).collect())
            .unwrap_or_default()
    }

    /// Highest number of simultaneously unacknowledged deliveries observed.
    pub async fn peak_unacked(&self) -> usize {
        self.state.lock().await.peak_unacked
    }

    /// Queue names in the order they were first declared.
    pub async fn declarations(&self) -> Vec<String> {
        self.state.lock().await.declarations.clone()
    }

    pub async fn open_channels(&self) -> usize {
        let state = self.state.lock().await;
        state.channels.values().filter(|c| !c.closed).count()
    }

    async fn settle(
        &self,
        queue: &str,
        tag: u64,
        requeue: Option<bool>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        let source = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        // A missing entry means the channel closed and the message went back
        // to the queue.
        let entry = source
            .unacked
            .remove(&tag)
            .ok_or(BrokerError::ChannelClosed)?;
        let dead_letter_target = source.spec.dead_letter_target.clone();

        match requeue {
            None => {}
            Some(true) => source.ready.push_front(Stored {
                redelivered: true,
                ..entry.stored.clone()
            }),
            Some(false) => {
                if let Some(target) = dead_letter_target
                    && let Some(dlq) = state.queues.get_mut(&target)
                {
                    dlq.ready.push_back(Stored {
                        message: entry.stored.message.clone(),
                        redelivered: false,
                    });
                }
            }
        }

        if let Some(channel) = state.channels.get_mut(&entry.channel) {
            channel.unacked = channel.unacked.saturating_sub(1);
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn next_delivery(
        &self,
        channel_id: u64,
        queue: &str,
        epoch: u64,
    ) -> Option<Result<Delivery, BrokerError>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.consumer_epoch != epoch {
                    return None;
                }
                let (prefetch, unacked) = match state.channel(channel_id) {
                    Ok(channel) => (channel.prefetch, channel.unacked),
                    Err(_) => return None,
                };
                let has_room = prefetch.is_none_or(|limit| unacked < usize::from(limit));

                let Some(q) = state.queues.get_mut(queue) else {
                    return Some(Err(BrokerError::UnknownQueue(queue.to_string())));
                };
                if has_room && let Some(stored) = q.ready.pop_front() {
                    state.next_tag += 1;
                    let tag = state.next_tag;
                    let delivery = Delivery::new(
                        tag,
                        stored.message.body.clone(),
                        stored.message.content_type.clone(),
                        stored.redelivered,
                        Box::new(MemoryAcker {
                            server: self.clone(),
                            queue: queue.to_string(),
                            tag,
                        }),
                    );
                    if let Some(q) = state.queues.get_mut(queue) {
                        q.unacked.insert(
                            tag,
                            Unacked {
                                stored,
                                channel: channel_id,
                            },
                        );
                    }
                    if let Some(channel) = state.channels.get_mut(&channel_id) {
                        channel.unacked += 1;
                    }
                    let total = state.total_unacked();
                    state.peak_unacked = state.peak_unacked.max(total);
                    return Some(Ok(delivery));
                }
            }

            notified.await;
        }
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Broker>, BrokerError> {
        {
            let mut state = self.state.lock().await;
            if state.refuse_connections > 0 {
                state.refuse_connections -= 1;
                return Err(BrokerError::Unavailable(format!(
                    "connection to {url} refused"
                )));
            }
        }
        Ok(Arc::new(self.channel().await))
    }
}

/// A channel on an [`InMemoryBroker`].
pub struct InMemoryChannel {
    id: u64,
    server: InMemoryBroker,
}

#[async_trait]
impl Broker for InMemoryChannel {
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        let mut state = self.server.state.lock().await;
        if state.fail_prefetch {
            return Err(BrokerError::PreconditionFailed(
                "basic.qos refused".to_string(),
            ));
        }
        state.channel_mut(self.id)?.prefetch = Some(count);
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let mut state = self.server.state.lock().await;
        state.channel(self.id)?;
        if let Some(existing) = state.queues.get(&spec.name) {
            return if existing.spec == *spec {
                Ok(())
            } else {
                Err(BrokerError::PreconditionFailed(format!(
                    "inequivalent arguments for queue '{}'",
                    spec.name
                )))
            };
        }
        state.declarations.push(spec.name.clone());
        state.queues.insert(
            spec.name.clone(),
            QueueState {
                spec: spec.clone(),
                ready: VecDeque::new(),
                unacked: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn publish(&self, queue: &str, message: Message) -> Result<(), BrokerError> {
        let mut state = self.server.state.lock().await;
        state.channel(self.id)?;
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(BrokerError::Unavailable("publish refused".to_string()));
        }
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))?;
        q.ready.push_back(Stored {
            message,
            redelivered: false,
        });
        drop(state);
        self.server.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        let epoch = {
            let state = self.server.state.lock().await;
            state.channel(self.id)?;
            if !state.queues.contains_key(queue) {
                return Err(BrokerError::UnknownQueue(queue.to_string()));
            }
            state.consumer_epoch
        };

        let server = self.server.clone();
        let channel_id = self.id;
        let queue = queue.to_string();
        let stream = futures::stream::unfold((), move |()| {
            let server = server.clone();
            let queue = queue.clone();
            async move {
                server
                    .next_delivery(channel_id, &queue, epoch)
                    .await
                    .map(|item| (item, ()))
            }
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut state = self.server.state.lock().await;
        let Some(channel) = state.channels.get_mut(&self.id) else {
            return Ok(());
        };
        if channel.closed {
            return Ok(());
        }
        channel.closed = true;
        channel.unacked = 0;

        for q in state.queues.values_mut() {
            let mut tags: Vec<u64> = q
                .unacked
                .iter()
                .filter(|(_, entry)| entry.channel == self.id)
                .map(|(tag, _)| *tag)
                .collect();
            // Highest tag first so the oldest delivery ends up at the head.
            tags.sort_unstable_by(|a, b| b.cmp(a));
            for tag in tags {
                if let Some(entry) = q.unacked.remove(&tag) {
                    q.ready.push_front(Stored {
                        redelivered: true,
                        ..entry.stored
                    });
                }
            }
        }
        drop(state);
        self.server.notify.notify_waiters();
        Ok(())
    }
}

struct MemoryAcker {
    server: InMemoryBroker,
    queue: String,
    tag: u64,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.server.settle(&self.queue, self.tag, None).await
    }

    async fn reject(&self, requeue: bool) -> Result<(), BrokerError> {
        self.server.settle(&self.queue, self.tag, Some(requeue)).await
    }
}
