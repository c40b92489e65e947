//! Broker port — the shared publish/subscribe connection.

use std::future::Future;

use tokio::sync::broadcast;

use tradfri_domain::error::TradfriError;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A connected broker, shared by every sender and subscriber of a process.
///
/// Broker-level subscriptions are not reference counted here; the
/// subscription manager does that on top.
pub trait Broker: Send + Sync + 'static {
    /// Publish `payload` on `topic`.
    ///
    /// Resolves once the client has enqueued the message for sending. That
    /// is not a delivery acknowledgement: the QoS 1 PUBACK is not awaited,
    /// and a message still queued when the connection is torn down is lost.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TradfriError>> + Send;

    /// Start receiving messages on `topic`.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send;

    /// Stop receiving messages on `topic`.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send;

    /// A new receiver on the shared inbound stream.
    ///
    /// Only messages arriving *after* this call are delivered to it.
    fn messages(&self) -> broadcast::Receiver<InboundMessage>;
}
