//! # tradfri-adapter-mqtt
//!
//! MQTT adapter — connects the components to a real broker.
//!
//! ## Responsibilities
//! - Connect to an MQTT broker and wait for the session to be acknowledged
//! - Implement the `Broker` port: publish, subscribe, unsubscribe
//! - Drive the rumqttc event loop and fan inbound publishes out to every
//!   subscription
//!
//! ## Dependency rule
//! Same as other adapters: depends on `tradfri-app` and `tradfri-domain`.

mod broker;
pub mod config;
pub mod error;

pub use broker::MqttBroker;
pub use config::MqttConfig;
pub use error::MqttError;
