//! Device command sender — validates, encodes and publishes commands.

use std::sync::Arc;

use tradfri_domain::command::Command;
use tradfri_domain::error::TradfriError;
use tradfri_domain::topic::TopicScheme;

use crate::codec;
use crate::ports::Broker;

/// Publishes [`Command`]s on the shared broker connection.
pub struct CommandSender<B> {
    broker: Arc<B>,
    topics: TopicScheme,
}

impl<B> Clone for CommandSender<B> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            topics: self.topics.clone(),
        }
    }
}

impl<B: Broker> CommandSender<B> {
    /// Create a sender publishing through `broker`.
    pub fn new(broker: Arc<B>, topics: TopicScheme) -> Self {
        Self { broker, topics }
    }

    /// Validate, encode and publish a command.
    ///
    /// A rejected command publishes nothing. Publish failures are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`TradfriError::Validation`] when a `Set` carries an
    /// out-of-range brightness, or the broker error if publishing fails.
    pub async fn send(&self, command: &Command) -> Result<(), TradfriError> {
        if let Command::Set { state, .. } = command {
            state.validate()?;
        }
        let outbound = codec::encode(command, &self.topics);
        tracing::debug!(topic = %outbound.topic, device = command.device(), "publishing command");
        self.broker.publish(&outbound.topic, outbound.payload).await
    }
}
