//! In-process broker backed by tokio broadcast channels.
//!
//! Behaves like a single-client MQTT broker: a publish on a topic the client
//! subscribed to loops back onto the inbound stream. Every publish and
//! (un)subscribe is recorded so callers can inspect the traffic, and
//! [`InProcessBroker::inject`] plays the part of a device reporting in.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use tradfri_domain::error::TradfriError;

use crate::ports::{Broker, InboundMessage};

/// Returned by [`InProcessBroker::publish`] while failures are switched on.
#[derive(Debug, thiserror::Error)]
#[error("publish rejected by in-process broker")]
pub struct PublishRejected;

/// Returned by [`InProcessBroker::unsubscribe`] while failures are switched on.
#[derive(Debug, thiserror::Error)]
#[error("unsubscribe rejected by in-process broker")]
pub struct UnsubscribeRejected;

#[derive(Default)]
struct Traffic {
    subscribed: HashSet<String>,
    subscribe_calls: Vec<String>,
    unsubscribe_calls: Vec<String>,
    published: Vec<InboundMessage>,
    fail_publishes: bool,
    fail_unsubscribes: bool,
}

/// Loopback broker living entirely in memory.
pub struct InProcessBroker {
    inbound: broadcast::Sender<InboundMessage>,
    outgoing: broadcast::Sender<InboundMessage>,
    traffic: Mutex<Traffic>,
}

impl InProcessBroker {
    /// Create a broker whose channels hold up to `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (inbound, _) = broadcast::channel(capacity);
        let (outgoing, _) = broadcast::channel(capacity);
        Self {
            inbound,
            outgoing,
            traffic: Mutex::new(Traffic::default()),
        }
    }

    /// Deliver a message as if a device had published it.
    ///
    /// Returns `false` when nobody is subscribed to `topic` (the message is
    /// dropped, as a real broker would).
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        if !self.lock().subscribed.contains(topic) {
            return false;
        }
        // broadcast::send fails only when there are zero receivers.
        let _ = self.inbound.send(InboundMessage::new(topic, payload));
        true
    }

    /// Everything published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<InboundMessage> {
        self.lock().published.clone()
    }

    /// Payloads published on `topic`, oldest first.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.lock()
            .published
            .iter()
            .filter(|msg| msg.topic == topic)
            .map(|msg| msg.payload.clone())
            .collect()
    }

    /// Observe publishes as they happen.
    #[must_use]
    pub fn outgoing(&self) -> broadcast::Receiver<InboundMessage> {
        self.outgoing.subscribe()
    }

    /// Whether the client currently holds a broker-level subscription.
    #[must_use]
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.lock().subscribed.contains(topic)
    }

    /// Every broker-level subscribe call, in order.
    #[must_use]
    pub fn subscribe_calls(&self) -> Vec<String> {
        self.lock().subscribe_calls.clone()
    }

    /// Every broker-level unsubscribe call, in order.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> Vec<String> {
        self.lock().unsubscribe_calls.clone()
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.lock().fail_publishes = fail;
    }

    /// Make subsequent unsubscribes fail. The call is still recorded and the
    /// subscription kept, as if the broker never saw the request.
    pub fn fail_unsubscribes(&self, fail: bool) {
        self.lock().fail_unsubscribes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Traffic> {
        self.traffic.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Broker for InProcessBroker {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TradfriError>> + Send {
        let result = {
            let mut traffic = self.lock();
            if traffic.fail_publishes {
                Err(TradfriError::broker(PublishRejected))
            } else {
                let message = InboundMessage::new(topic, payload);
                traffic.published.push(message.clone());
                if traffic.subscribed.contains(topic) {
                    let _ = self.inbound.send(message.clone());
                }
                let _ = self.outgoing.send(message);
                Ok(())
            }
        };
        async { result }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send {
        {
            let mut traffic = self.lock();
            traffic.subscribed.insert(topic.to_string());
            traffic.subscribe_calls.push(topic.to_string());
        }
        async { Ok(()) }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send {
        let result = {
            let mut traffic = self.lock();
            traffic.unsubscribe_calls.push(topic.to_string());
            if traffic.fail_unsubscribes {
                Err(TradfriError::broker(UnsubscribeRejected))
            } else {
                traffic.subscribed.remove(topic);
                Ok(())
            }
        };
        async { result }
    }

    fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }
}
