//! # tradfrid — tradfri remote/light daemon
//!
//! Composition root that connects to the broker and runs the components.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars), see [`tradfrid::config`]
//! - Install the `tracing` subscriber
//! - Connect to the MQTT broker and build the shared `Context`
//! - Log protocol violations reported on the supervisory channel
//! - Run the echo-suppression coordinator and the brightness controller
//!   until one of them fails or the process is interrupted
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tradfri_adapter_mqtt::MqttBroker;
use tradfri_app::brightness_controller::BrightnessController;
use tradfri_app::context::Context;
use tradfri_app::echo_suppression::EchoSuppressionCoordinator;
use tradfri_app::ports::Broker;
use tradfri_domain::error::{ProtocolViolation, TradfriError};
use tradfri_domain::level::LightLevels;

use tradfrid::config::Config;

const VIOLATION_CAPACITY: usize = 64;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    let broker = Arc::new(MqttBroker::connect(&config.mqtt).await?);
    let (context, violations) = Context::new(
        broker,
        config.topic_scheme(),
        LightLevels::default(),
        VIOLATION_CAPACITY,
    );
    tokio::spawn(log_violations(violations));

    tokio::select! {
        result = run(context, &config) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted, shutting down");
        }
    }

    Ok(())
}

/// Run the enabled components side by side.
///
/// The coordinator takes its baseline before the controller starts reading
/// the remote.
async fn run<B: Broker>(context: Context<B>, config: &Config) -> Result<(), TradfriError> {
    let coordinator = if config.resetter.enabled {
        Some(EchoSuppressionCoordinator::start(context.clone(), config.coordinator()).await?)
    } else {
        None
    };
    let controller = config
        .remote
        .enabled
        .then(|| BrightnessController::new(context, config.controller()));

    let coordinate = async {
        match coordinator {
            Some(coordinator) => coordinator.run().await,
            None => pending().await,
        }
    };
    let control = async {
        match &controller {
            Some(controller) => controller.run().await,
            None => pending().await,
        }
    };

    tokio::select! {
        result = coordinate => result,
        result = control => result,
    }
}

async fn log_violations(mut violations: mpsc::Receiver<ProtocolViolation>) {
    while let Some(violation) = violations.recv().await {
        tracing::warn!(
            topic = %violation.topic,
            error = %violation.source,
            "protocol violation"
        );
    }
}
