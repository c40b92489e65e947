use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use tradfri_app::ports::{Broker, InboundMessage};
use tradfri_domain::error::TradfriError;

use crate::config::MqttConfig;
use crate::error::MqttError;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type Topics = Arc<Mutex<BTreeSet<String>>>;

/// A broker connection backed by rumqttc.
///
/// All traffic uses QoS 1. The event loop runs on a background task that is
/// stopped by [`close`](Self::close) or when the broker is dropped; it
/// reconnects on its own and restores the active subscriptions afterwards.
pub struct MqttBroker {
    client: AsyncClient,
    inbound: broadcast::Sender<InboundMessage>,
    topics: Topics,
    events: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Connect and wait for the broker to acknowledge the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails, is refused, or is not
    /// acknowledged within the configured timeout.
    pub async fn connect(config: &MqttConfig) -> Result<Self, MqttError> {
        let mut options = MqttOptions::new(
            config.client_id.as_str(),
            config.broker_host.as_str(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive());

        let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity);

        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            "connecting to broker"
        );
        tokio::time::timeout(config.connect_timeout(), wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| MqttError::ConnectTimeout(config.connect_timeout()))??;
        tracing::info!("connected to broker");

        let (inbound, _) = broadcast::channel(config.channel_capacity);
        let topics = Topics::default();
        let events = tokio::spawn(drive(
            eventloop,
            client.clone(),
            inbound.clone(),
            Arc::clone(&topics),
        ));

        Ok(Self {
            client,
            inbound,
            topics,
            events: Mutex::new(Some(events)),
        })
    }

    /// Disconnect cleanly and wait for the event loop to stop.
    ///
    /// Requests are handled in order, so everything published before this
    /// call has been written to the connection once it returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect cannot be queued or the event loop
    /// does not stop in time.
    pub async fn close(&self) -> Result<(), MqttError> {
        let Some(events) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        self.client.disconnect().await.map_err(MqttError::Client)?;
        match tokio::time::timeout(CLOSE_TIMEOUT, events).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                tracing::warn!(%err, "event loop task ended abnormally");
                Ok(())
            }
            Err(_) => Err(MqttError::CloseTimeout(CLOSE_TIMEOUT)),
        }
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        if let Some(events) = self
            .events
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            events.abort();
        }
    }
}

impl Broker for MqttBroker {
    /// Resolves once rumqttc has queued the publish. The broker's PUBACK is
    /// not awaited, so this says nothing about delivery.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TradfriError>> + Send {
        async move {
            self.client
                .publish(topic, QoS::AtLeastOnce, false, payload)
                .await
                .map_err(|err| MqttError::Client(err).into())
        }
    }

    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send {
        async move {
            self.client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .map_err(MqttError::Client)?;
            lock(&self.topics).insert(topic.to_string());
            Ok(())
        }
    }

    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), TradfriError>> + Send {
        async move {
            lock(&self.topics).remove(topic);
            self.client
                .unsubscribe(topic)
                .await
                .map_err(|err| MqttError::Client(err).into())
        }
    }

    fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }
}

fn lock(topics: &Topics) -> MutexGuard<'_, BTreeSet<String>> {
    topics.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), MqttError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(MqttError::Refused(code)),
                };
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => return Err(MqttError::Refused(code)),
            Err(err) => return Err(MqttError::Connection(err)),
        }
    }
}

/// What the event loop does after an event.
#[derive(Debug, PartialEq, Eq)]
enum Dispatch {
    /// A publish went out to the subscribers.
    Forwarded,
    /// The session was re-established; these topics must be subscribed again.
    Resubscribe(Vec<String>),
    /// A disconnect was sent; the loop ends.
    Stop,
    Ignored,
}

fn dispatch(event: Event, inbound: &broadcast::Sender<InboundMessage>, topics: &Topics) -> Dispatch {
    match event {
        Event::Incoming(Packet::Publish(publish)) => {
            tracing::trace!(topic = %publish.topic, size = publish.payload.len(), "received");
            // no receivers means nobody is subscribed yet
            let _ = inbound.send(InboundMessage::new(publish.topic, publish.payload.to_vec()));
            Dispatch::Forwarded
        }
        // the first ConnAck is consumed by `connect`, any later one is a reconnect
        Event::Incoming(Packet::ConnAck(_)) => {
            Dispatch::Resubscribe(lock(topics).iter().cloned().collect())
        }
        Event::Outgoing(Outgoing::Disconnect) => Dispatch::Stop,
        _ => Dispatch::Ignored,
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound: broadcast::Sender<InboundMessage>,
    topics: Topics,
) {
    loop {
        match eventloop.poll().await {
            Ok(event) => match dispatch(event, &inbound, &topics) {
                Dispatch::Resubscribe(topics) => {
                    tracing::info!(count = topics.len(), "reconnected, restoring subscriptions");
                    for topic in topics {
                        if let Err(err) = client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                            tracing::warn!(%topic, %err, "failed to restore subscription");
                        }
                    }
                }
                Dispatch::Stop => {
                    tracing::info!("disconnected from broker");
                    return;
                }
                Dispatch::Forwarded | Dispatch::Ignored => {}
            },
            Err(err) => {
                tracing::warn!(%err, "broker connection lost, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish};

    fn topics(names: &[&str]) -> Topics {
        Arc::new(Mutex::new(names.iter().map(ToString::to_string).collect()))
    }

    /// A broker whose event loop is never polled, so nothing reaches a network.
    fn offline_broker() -> (MqttBroker, EventLoop) {
        let (client, eventloop) =
            AsyncClient::new(MqttOptions::new("tradfrid-test", "localhost", 1883), 8);
        let (inbound, _) = broadcast::channel(8);
        let broker = MqttBroker {
            client,
            inbound,
            topics: Topics::default(),
            events: Mutex::new(None),
        };
        (broker, eventloop)
    }

    #[tokio::test]
    async fn should_resolve_publish_once_queued() {
        let (broker, _eventloop) = offline_broker();

        let published = tokio::time::timeout(
            Duration::from_secs(1),
            broker.publish("zigbee2mqtt/ikea/set", br#"{"state":"TOGGLE"}"#.to_vec()),
        )
        .await;

        assert!(matches!(published, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn should_track_topics_for_resubscription() {
        let (broker, _eventloop) = offline_broker();
        broker.subscribe("zigbee2mqtt/remote").await.unwrap();
        broker.subscribe("zigbee2mqtt/ikea").await.unwrap();
        broker.unsubscribe("zigbee2mqtt/remote").await.unwrap();

        let (inbound, _) = broadcast::channel(4);
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            true,
        )));
        assert_eq!(
            dispatch(event, &inbound, &broker.topics),
            Dispatch::Resubscribe(vec!["zigbee2mqtt/ikea".to_string()])
        );
    }

    #[tokio::test]
    async fn should_close_without_running_event_loop() {
        let (broker, _eventloop) = offline_broker();
        broker.close().await.unwrap();
    }

    #[test]
    fn should_forward_incoming_publish() {
        let (inbound, mut rx) = broadcast::channel(4);
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "zigbee2mqtt/ikea",
            QoS::AtLeastOnce,
            br#"{"state":"ON"}"#.to_vec(),
        )));

        assert_eq!(dispatch(event, &inbound, &topics(&[])), Dispatch::Forwarded);
        assert_eq!(
            rx.try_recv().unwrap(),
            InboundMessage::new("zigbee2mqtt/ikea", br#"{"state":"ON"}"#.to_vec())
        );
    }

    #[test]
    fn should_forward_publish_without_subscribers() {
        let (inbound, _) = broadcast::channel(4);
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "tradfri/light-resetter",
            QoS::AtLeastOnce,
            b"\"suppress-next\"".to_vec(),
        )));

        assert_eq!(dispatch(event, &inbound, &topics(&[])), Dispatch::Forwarded);
    }

    #[test]
    fn should_resubscribe_tracked_topics_after_reconnect() {
        let (inbound, mut rx) = broadcast::channel(4);
        let tracked = topics(&["zigbee2mqtt/remote", "tradfri/light-resetter", "zigbee2mqtt/ikea"]);
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));

        assert_eq!(
            dispatch(event, &inbound, &tracked),
            Dispatch::Resubscribe(vec![
                "tradfri/light-resetter".to_string(),
                "zigbee2mqtt/ikea".to_string(),
                "zigbee2mqtt/remote".to_string(),
            ])
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn should_stop_after_disconnect() {
        let (inbound, _) = broadcast::channel(4);
        let event = Event::Outgoing(Outgoing::Disconnect);
        assert_eq!(dispatch(event, &inbound, &topics(&[])), Dispatch::Stop);
    }

    #[test]
    fn should_ignore_protocol_chatter() {
        let (inbound, mut rx) = broadcast::channel(4);
        for event in [
            Event::Incoming(Packet::PingResp),
            Event::Outgoing(Outgoing::PingReq),
            Event::Outgoing(Outgoing::Publish(1)),
        ] {
            assert_eq!(dispatch(event, &inbound, &topics(&["zigbee2mqtt/ikea"])), Dispatch::Ignored);
        }
        assert!(rx.try_recv().is_err());
    }
}
