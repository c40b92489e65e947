//! One-shot `set`: push the configured state to the light and return.

use tradfri_app::context::Context;
use tradfri_app::ports::Broker;
use tradfri_domain::error::TradfriError;

use crate::config::Config;

/// Publish the `[set]` state to the configured light, once.
///
/// Nothing is published when the state is out of range.
///
/// # Errors
///
/// Returns the validation error for an out-of-range brightness, or the
/// broker error if publishing fails.
pub async fn send_configured_state<B: Broker>(
    context: &Context<B>,
    config: &Config,
) -> Result<(), TradfriError> {
    let command = config.set_command();
    context.send(&command).await?;
    tracing::info!(
        light = command.device(),
        state = %config.set.state,
        brightness = config.set.brightness,
        color_temp = config.set.color_temp,
        "state sent"
    );
    Ok(())
}
