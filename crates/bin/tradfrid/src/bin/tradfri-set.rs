//! # tradfri-set — set the light once and exit
//!
//! Reads the target from the `[set]` section of `tradfri.toml` or the
//! `TRADFRI_SET_STATE`, `TRADFRI_SET_BRIGHTNESS` and `TRADFRI_SET_COLOR_TEMP`
//! environment variables, publishes one `set` to the configured light and
//! disconnects once the message has been handed to the connection.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tradfri_adapter_mqtt::MqttBroker;
use tradfri_app::context::Context;
use tradfri_domain::level::LightLevels;

use tradfrid::config::Config;
use tradfrid::set::send_configured_state;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    let broker = Arc::new(MqttBroker::connect(&config.mqtt).await?);
    // nothing is subscribed, so no violation can be reported
    let (context, _violations) = Context::new(
        Arc::clone(&broker),
        config.topic_scheme(),
        LightLevels::default(),
        1,
    );

    let sent = send_configured_state(&context, &config).await;
    broker.close().await?;
    sent?;

    Ok(())
}
