//! MQTT connection configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the broker connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// How long to wait for the broker to acknowledge the connection, in seconds.
    pub connect_timeout_secs: u16,
    /// Capacity of the client request queue and of the inbound fan-out channel.
    pub channel_capacity: usize,
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connect_timeout_secs))
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "tradfrid".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            channel_capacity: 64,
        }
    }
}
