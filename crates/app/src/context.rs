//! Explicit context shared by every component of a process.
//!
//! Built once at startup and handed to each component constructor; there is
//! no process-wide connection or argument singleton.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tradfri_domain::command::Command;
use tradfri_domain::error::{ProtocolViolation, TradfriError};
use tradfri_domain::level::LightLevels;
use tradfri_domain::topic::TopicScheme;

use crate::codec::MessageKind;
use crate::command_sender::CommandSender;
use crate::ports::Broker;
use crate::subscriptions::{Subscription, SubscriptionManager};

/// Connection, topic scheme and level table, shared read-only.
pub struct Context<B> {
    sender: CommandSender<B>,
    subscriptions: SubscriptionManager<B>,
    levels: Arc<LightLevels>,
}

impl<B> Clone for Context<B> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            subscriptions: self.subscriptions.clone(),
            levels: Arc::clone(&self.levels),
        }
    }
}

impl<B: Broker> Context<B> {
    /// Build the context around a connected broker.
    ///
    /// Also returns the supervisory channel on which protocol violations
    /// are reported; it holds up to `violation_capacity` unread reports.
    pub fn new(
        broker: Arc<B>,
        topics: TopicScheme,
        levels: LightLevels,
        violation_capacity: usize,
    ) -> (Self, mpsc::Receiver<ProtocolViolation>) {
        let (violations_tx, violations_rx) = mpsc::channel(violation_capacity);
        let context = Self {
            sender: CommandSender::new(Arc::clone(&broker), topics.clone()),
            subscriptions: SubscriptionManager::new(broker, topics, violations_tx),
            levels: Arc::new(levels),
        };
        (context, violations_rx)
    }

    /// The level table.
    #[must_use]
    pub fn levels(&self) -> &LightLevels {
        &self.levels
    }

    /// Validate, encode and publish a command.
    ///
    /// # Errors
    ///
    /// See [`CommandSender::send`].
    pub async fn send(&self, command: &Command) -> Result<(), TradfriError> {
        self.sender.send(command).await
    }

    /// Subscribe to messages of kind `K` concerning `device`.
    ///
    /// # Errors
    ///
    /// See [`SubscriptionManager::subscribe`].
    pub async fn subscribe<K: MessageKind>(
        &self,
        device: &str,
    ) -> Result<Subscription<K, B>, TradfriError> {
        self.subscriptions.subscribe::<K>(device).await
    }

    /// Send `request` and wait for exactly one reply of kind `K` from `device`.
    ///
    /// Subscribes before sending, consumes the first decoded reply and
    /// detaches again, so at most one reply is ever acted upon.
    ///
    /// # Errors
    ///
    /// Returns [`TradfriError::ReplyTimeout`] when nothing arrives within
    /// `timeout`, or any error from subscribing, sending or decoding the
    /// reply. A failure to detach afterwards is logged, not returned.
    pub async fn request_once<K: MessageKind>(
        &self,
        device: &str,
        request: &Command,
        timeout: Duration,
    ) -> Result<K::Event, TradfriError> {
        let mut subscription = self.subscribe::<K>(device).await?;

        if let Err(err) = self.send(request).await {
            if let Err(unsubscribe_err) = subscription.unsubscribe().await {
                tracing::warn!(%unsubscribe_err, "failed to detach one-shot subscription");
            }
            return Err(err);
        }

        let reply = tokio::time::timeout(timeout, subscription.next()).await;
        let topic = subscription.topic().to_string();
        if let Err(err) = subscription.unsubscribe().await {
            // the outcome is already decided, detaching is best effort
            tracing::warn!(%topic, %err, "failed to detach one-shot subscription");
        }

        match reply {
            Ok(event) => event,
            Err(_) => Err(TradfriError::ReplyTimeout {
                topic,
                waited: timeout,
            }),
        }
    }
}
