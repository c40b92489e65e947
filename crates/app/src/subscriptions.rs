//! Subscription manager — typed, topic-filtered views of the shared inbound stream.
//!
//! Every [`Subscription`] owns its own receiver on the broker's inbound
//! stream, keeps only messages whose topic equals the resolved topic and
//! decodes them with the codec. Broker-level subscriptions are reference
//! counted per topic: the first handle on a topic subscribes, the last one
//! to go away unsubscribes.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use tradfri_domain::error::{ProtocolViolation, TradfriError};
use tradfri_domain::topic::TopicScheme;

use crate::codec::MessageKind;
use crate::ports::{Broker, InboundMessage};

/// Resolves subscription requests and tracks broker-level subscriptions.
pub struct SubscriptionManager<B> {
    broker: Arc<B>,
    topics: TopicScheme,
    handles: Arc<Mutex<HashMap<String, usize>>>,
    violations: mpsc::Sender<ProtocolViolation>,
}

impl<B> Clone for SubscriptionManager<B> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            topics: self.topics.clone(),
            handles: Arc::clone(&self.handles),
            violations: self.violations.clone(),
        }
    }
}

impl<B: Broker> SubscriptionManager<B> {
    /// Create a manager reporting protocol violations on `violations`.
    pub fn new(
        broker: Arc<B>,
        topics: TopicScheme,
        violations: mpsc::Sender<ProtocolViolation>,
    ) -> Self {
        Self {
            broker,
            topics,
            handles: Arc::new(Mutex::new(HashMap::new())),
            violations,
        }
    }

    /// Subscribe to messages of kind `K` concerning `device`.
    ///
    /// The receiver is attached before the broker-level subscribe is issued,
    /// so nothing published after this call returns can be missed.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the broker-level subscribe fails.
    pub async fn subscribe<K: MessageKind>(
        &self,
        device: &str,
    ) -> Result<Subscription<K, B>, TradfriError> {
        let topic = K::KIND.topic(&self.topics, device);
        let receiver = self.broker.messages();

        if self.acquire(&topic) {
            if let Err(err) = self.broker.subscribe(&topic).await {
                self.release_handle(&topic);
                return Err(err);
            }
            tracing::debug!(%topic, "broker subscription opened");
        }
        tracing::trace!(%topic, kind = ?K::KIND, "subscribed");

        Ok(Subscription {
            topic,
            device: device.to_string(),
            receiver,
            manager: self.clone(),
            active: true,
            kind: PhantomData,
        })
    }

    /// Number of live handles on `topic`.
    #[must_use]
    pub fn handle_count(&self, topic: &str) -> usize {
        self.lock().get(topic).copied().unwrap_or(0)
    }

    /// Register a handle; `true` when it is the first one on `topic`.
    fn acquire(&self, topic: &str) -> bool {
        let mut handles = self.lock();
        let count = handles.entry(topic.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop a handle; `true` when it was the last one on `topic`.
    fn release_handle(&self, topic: &str) -> bool {
        let mut handles = self.lock();
        match handles.get_mut(topic) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                handles.remove(topic);
                true
            }
            None => false,
        }
    }

    async fn release(&self, topic: &str) -> Result<(), TradfriError> {
        if self.release_handle(topic) {
            self.broker.unsubscribe(topic).await?;
            tracing::debug!(%topic, "broker subscription closed");
        }
        Ok(())
    }

    fn report(&self, violation: ProtocolViolation) {
        tracing::debug!(topic = %violation.topic, error = %violation.source, "protocol violation");
        if let Err(err) = self.violations.try_send(violation) {
            tracing::warn!(%err, "protocol violation dropped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription yielding events of kind `K`.
///
/// Call [`unsubscribe`](Self::unsubscribe) to detach. A subscription that is
/// simply dropped releases its topic from a background task instead.
pub struct Subscription<K: MessageKind, B: Broker> {
    topic: String,
    device: String,
    receiver: broadcast::Receiver<InboundMessage>,
    manager: SubscriptionManager<B>,
    active: bool,
    kind: PhantomData<fn() -> K>,
}

impl<K: MessageKind, B: Broker> Subscription<K, B> {
    /// The topic this subscription listens on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next event.
    ///
    /// Payloads that fail to decode never surface here: on fixed-shape topics
    /// they are reported as [`ProtocolViolation`]s, on the bridge log they are
    /// skipped. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns [`TradfriError::ConnectionClosed`] once the inbound stream ends.
    pub async fn next(&mut self) -> Result<K::Event, TradfriError> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "inbound stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return Err(TradfriError::ConnectionClosed),
            };
            if message.topic != self.topic {
                continue;
            }
            match K::decode(&message.payload, &self.device) {
                Ok(event) => return Ok(event),
                Err(source) if K::KIND.has_fixed_shape() => {
                    self.manager.report(ProtocolViolation {
                        topic: message.topic,
                        source,
                    });
                }
                Err(err) => {
                    tracing::trace!(topic = %self.topic, %err, "skipping unrelated payload");
                }
            }
        }
    }

    /// Detach from the stream, closing the broker subscription if this was
    /// the last handle on the topic.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the broker-level unsubscribe fails.
    pub async fn unsubscribe(mut self) -> Result<(), TradfriError> {
        self.active = false;
        self.manager.release(&self.topic).await
    }
}

impl<K: MessageKind, B: Broker> Drop for Subscription<K, B> {
    fn drop(&mut self) {
        if !self.active || !self.manager.release_handle(&self.topic) {
            return;
        }
        let topic = std::mem::take(&mut self.topic);
        let broker = Arc::clone(&self.manager.broker);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = broker.unsubscribe(&topic).await {
                        tracing::warn!(%topic, %err, "failed to close dropped subscription");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%topic, "no runtime to close dropped subscription");
            }
        }
    }
}
