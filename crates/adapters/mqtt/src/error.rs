//! MQTT adapter error types.

use std::time::Duration;

use tradfri_domain::error::TradfriError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The broker did not acknowledge the connection in time.
    #[error("broker did not acknowledge the connection within {0:?}")]
    ConnectTimeout(Duration),

    /// The connection failed before it was acknowledged.
    #[error("MQTT connection failed")]
    Connection(#[source] rumqttc::ConnectionError),

    /// The broker refused the connection.
    #[error("MQTT connection refused: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// The event loop did not stop after the disconnect was sent.
    #[error("event loop did not stop within {0:?} of disconnecting")]
    CloseTimeout(Duration),
}

impl From<MqttError> for TradfriError {
    fn from(err: MqttError) -> Self {
        TradfriError::broker(err)
    }
}
