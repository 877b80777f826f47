/// Topic-based message bus for inter-agent communication.
/// Fans every published message out to the subscribers of its topic and layers
/// correlated request/response calls on the same publish path.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{BusError, BusResult};

/// Reserved content field pairing a request with its response.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

// ============================================================================
// Message
// ============================================================================

/// Envelope routed by the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Source agent/component identifier
    pub sender: String,
    /// Destination agent/component (None for broadcast)
    pub recipient: Option<String>,
    /// Routing key
    pub topic: String,
    /// Message payload
    pub content: Map<String, Value>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create an empty message on a topic
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: String::new(),
            recipient: None,
            topic: topic.into(),
            content: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the sender
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Set the recipient
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    /// Replace the content. See [`into_content`] for non-object values.
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = into_content(content);
        self
    }

    /// Set a single content field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    /// Correlation id, if this message takes part in a request/response exchange
    pub fn correlation_id(&self) -> Option<&str> {
        self.content.get(CORRELATION_ID_KEY).and_then(Value::as_str)
    }

    /// String field accessor
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    /// Build a response on `topic` that carries this message's correlation id.
    pub fn reply(&self, topic: impl Into<String>, content: Value) -> Message {
        let mut response = Message::new(topic).with_content(content);
        if !self.sender.is_empty() {
            response.recipient = Some(self.sender.clone());
        }
        if let Some(correlation_id) = self.correlation_id() {
            response
                .content
                .insert(CORRELATION_ID_KEY.to_string(), Value::from(correlation_id));
        }
        response
    }
}

/// Convert a JSON value into message content.
///
/// Objects are used as-is, `null` becomes empty content, and any other value
/// is stored under the `"value"` key.
pub fn into_content(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Trait for message subscribers
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a message
    async fn handle(&self, message: &Message) -> BusResult<()>;

    /// Get handler name
    fn name(&self) -> &str;
}

/// Adapts an async closure into a [`MessageHandler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BusResult<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BusResult<()>> + Send + 'static,
{
    async fn handle(&self, message: &Message) -> BusResult<()> {
        (self.f)(message.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapts a synchronous closure into a [`MessageHandler`]; it runs inline
/// when the dispatch future is polled.
pub struct SyncHandler<F> {
    name: String,
    f: F,
}

impl<F> SyncHandler<F>
where
    F: Fn(&Message) -> BusResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> MessageHandler for SyncHandler<F>
where
    F: Fn(&Message) -> BusResult<()> + Send + Sync,
{
    async fn handle(&self, message: &Message) -> BusResult<()> {
        (self.f)(message)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn MessageHandler>,
}

// ============================================================================
// Request/Response Protocol
// ============================================================================

struct PendingRequest {
    /// Id of the request message itself, which must not resolve its own entry
    request_id: String,
    waiter: oneshot::Sender<Message>,
}

/// Removes a pending entry when the requesting future finishes or is dropped.
struct PendingGuard {
    pending: Arc<DashMap<String, PendingRequest>>,
    correlation_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

// ============================================================================
// Message Bus
// ============================================================================

/// Statistics for the message bus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages passed to `publish`
    pub published: u64,
    /// Successful subscriber deliveries
    pub delivered: u64,
    /// Messages consumed as responses to pending requests
    pub responses_routed: u64,
    /// Failed subscriber deliveries
    pub failed: u64,
    /// Requests that expired
    pub timeouts: u64,
    /// Messages per topic
    pub per_topic: HashMap<String, u64>,
}

/// Configuration for the message bus
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    /// Default timeout for `request`
    pub request_timeout: Duration,
    /// Enable message history
    pub enable_history: bool,
    /// Max history size
    pub max_history_size: usize,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            enable_history: true,
            max_history_size: 1000,
        }
    }
}

/// Publish/subscribe bus with correlated request/response.
///
/// Cloning is cheap and every clone shares the same subscriber and pending
/// request tables. Unrelated subsystems sharing one bus also share these
/// tables, so they should namespace their topics or use separate buses.
#[derive(Clone)]
pub struct MessageBus {
    config: MessageBusConfig,
    subscribers: Arc<DashMap<String, Vec<Subscription>>>,
    pending: Arc<DashMap<String, PendingRequest>>,
    next_subscription: Arc<AtomicU64>,
    stats: Arc<Mutex<BusStats>>,
    history: Arc<Mutex<VecDeque<Message>>>,
}

impl MessageBus {
    /// Create a new message bus
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            history: Arc::new(Mutex::new(VecDeque::with_capacity(
                config.max_history_size.min(1024),
            ))),
            config,
            subscribers: Arc::new(DashMap::new()),
            pending: Arc::new(DashMap::new()),
            next_subscription: Arc::new(AtomicU64::new(1)),
            stats: Arc::new(Mutex::new(BusStats::default())),
        }
    }

    /// Bus configuration
    pub fn config(&self) -> &MessageBusConfig {
        &self.config
    }

    /// Subscribe a handler to a topic
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> SubscriptionId {
        let topic = topic.into();
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        debug!("Subscribing '{}' to topic '{}'", handler.name(), topic);
        self.subscribers
            .entry(topic)
            .or_default()
            .push(Subscription { id, handler });
        id
    }

    /// Subscribe an async closure to a topic
    pub fn subscribe_fn<F, Fut>(&self, topic: impl Into<String>, f: F) -> SubscriptionId
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BusResult<()>> + Send + 'static,
    {
        let topic = topic.into();
        let handler = FnHandler::new(format!("fn:{}", topic), f);
        self.subscribe(topic, Arc::new(handler))
    }

    /// Subscribe a synchronous closure to a topic
    pub fn subscribe_sync<F>(&self, topic: impl Into<String>, f: F) -> SubscriptionId
    where
        F: Fn(&Message) -> BusResult<()> + Send + Sync + 'static,
    {
        let topic = topic.into();
        let handler = SyncHandler::new(format!("sync:{}", topic), f);
        self.subscribe(topic, Arc::new(handler))
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscribers.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.id != id);
            removed |= entry.len() != before;
        }
        self.subscribers.retain(|_, subs| !subs.is_empty());
        removed
    }

    /// Number of subscribers on a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of requests still awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Whether a request with this correlation id is still waiting
    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Publish a message.
    ///
    /// A message whose `correlation_id` matches a pending request resolves
    /// that request and is not broadcast. Otherwise every subscriber of the
    /// topic is invoked concurrently and this call returns once all of them
    /// have finished. Failures are collected: every subscriber runs, and if
    /// any failed the error lists all of them.
    pub async fn publish(&self, message: Message) -> BusResult<()> {
        self.record(&message);

        if let Some(correlation_id) = message.correlation_id().map(str::to_owned) {
            let resolved = self
                .pending
                .remove_if(&correlation_id, |_, p| p.request_id != message.id);
            if let Some((_, pending)) = resolved {
                debug!(
                    "Routing message {} as response to request {}",
                    message.id, correlation_id
                );
                self.stats.lock().responses_routed += 1;
                if pending.waiter.send(message).is_err() {
                    debug!("Requester for {} is gone", correlation_id);
                }
                return Ok(());
            }
        }

        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .subscribers
            .get(&message.topic)
            .map(|subs| subs.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!("No subscribers for topic '{}'", message.topic);
            return Ok(());
        }

        debug!(
            "Dispatching message {} to {} subscriber(s) on '{}'",
            message.id,
            handlers.len(),
            message.topic
        );

        let results = join_all(handlers.iter().map(|h| h.handle(&message))).await;

        let failures: Vec<String> = results
            .into_iter()
            .zip(handlers.iter())
            .filter_map(|(result, handler)| {
                result.err().map(|e| format!("{}: {}", handler.name(), e))
            })
            .collect();

        {
            let mut stats = self.stats.lock();
            stats.delivered += (handlers.len() - failures.len()) as u64;
            stats.failed += failures.len() as u64;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(
                "{} subscriber(s) failed on topic '{}'",
                failures.len(),
                message.topic
            );
            Err(BusError::SubscriberFailed {
                topic: message.topic,
                failures,
            })
        }
    }

    /// Send a request on `topic` and wait for the correlated response using
    /// the configured default timeout.
    pub async fn request(&self, topic: impl Into<String>, content: Value) -> BusResult<Message> {
        self.request_with_timeout(topic, content, self.config.request_timeout)
            .await
    }

    /// Send a request on `topic` and wait up to `timeout` for the response.
    pub async fn request_with_timeout(
        &self,
        topic: impl Into<String>,
        content: Value,
        timeout: Duration,
    ) -> BusResult<Message> {
        let message = Message::new(topic).with_content(content);
        self.request_message(message, timeout).await
    }

    /// Send a prepared message as a request.
    ///
    /// A fresh correlation id is merged into the content. The responder is
    /// expected to publish a message carrying the same id on any topic.
    ///
    /// The request is published from its own task, so `timeout` only bounds
    /// the wait: subscribers still handling the request run to completion.
    pub async fn request_message(&self, message: Message, timeout: Duration) -> BusResult<Message> {
        let correlation_id = Uuid::new_v4().to_string();
        let message = message.with_field(CORRELATION_ID_KEY, correlation_id.clone());
        let topic = message.topic.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            correlation_id.clone(),
            PendingRequest {
                request_id: message.id.clone(),
                waiter: tx,
            },
        );
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            correlation_id: correlation_id.clone(),
        };

        debug!("Request {} on topic '{}'", correlation_id, topic);

        let bus = self.clone();
        let dispatch = tokio::spawn(async move { bus.publish(message).await });

        let exchange = async {
            dispatch
                .await
                .map_err(|e| BusError::Handler(format!("request dispatch failed: {}", e)))??;
            rx.await
                .map_err(|_| BusError::ChannelClosed(correlation_id.clone()))
        };

        let outcome = tokio::time::timeout(timeout, exchange).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.stats.lock().timeouts += 1;
                warn!(
                    "Request {} on '{}' timed out after {:?}",
                    correlation_id, topic, timeout
                );
                Err(BusError::Timeout {
                    topic,
                    correlation_id,
                    timeout,
                })
            }
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> BusStats {
        self.stats.lock().clone()
    }

    /// Get message history
    pub fn history(&self) -> Vec<Message> {
        self.history.lock().iter().cloned().collect()
    }

    /// Clear message history
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn record(&self, message: &Message) {
        {
            let mut stats = self.stats.lock();
            stats.published += 1;
            *stats.per_topic.entry(message.topic.clone()).or_insert(0) += 1;
        }

        if self.config.enable_history && self.config.max_history_size > 0 {
            let mut history = self.history.lock();
            if history.len() >= self.config.max_history_size {
                history.pop_front();
            }
            history.push_back(message.clone());
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(MessageBusConfig::default())
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("topics", &self.subscribers.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Log a one-line summary of bus activity
pub fn log_stats(bus: &MessageBus) {
    let stats = bus.stats();
    info!(
        "Bus: {} published, {} delivered, {} responses, {} failed, {} timeouts",
        stats.published, stats.delivered, stats.responses_routed, stats.failed, stats.timeouts
    );
}

// ============================================================================
// Tests
// ============================================================================
