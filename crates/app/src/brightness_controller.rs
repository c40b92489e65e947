//! Brightness level controller — turns remote button presses into light commands.
//!
//! Toggle and arrow buttons map straight onto a command. Brightness buttons
//! run a get/await/react cycle: ask the light for its state, wait for exactly
//! one reply, then step one level along the level table.
//!
//! Two controllers reacting to the same light at the same moment may both read
//! the same state and publish conflicting `Set`s; within one controller the
//! cycles run one after another.

use std::time::Duration;

use tradfri_domain::command::Command;
use tradfri_domain::error::TradfriError;
use tradfri_domain::level::LightLevels;
use tradfri_domain::light::{LightState, Power};
use tradfri_domain::remote::{BrightnessChange, RemoteAction};

use crate::codec::{LightStates, RemoteActions};
use crate::context::Context;
use crate::ports::Broker;

/// Level the light comes up at when switched on with an up/on button.
pub const POWER_ON_LEVEL: usize = 2;

/// Devices and timing for a [`BrightnessController`].
#[derive(Debug, Clone)]
pub struct BrightnessControllerConfig {
    /// Light to control.
    pub light: String,
    /// Remote to listen to.
    pub remote: String,
    /// Plug toggled by the arrow buttons, if any.
    pub plug: Option<String>,
    /// Name the echo-suppression coordinator listens on.
    pub resetter: String,
    /// How long to wait for the light to report its state.
    pub reply_timeout: Duration,
}

/// What a brightness-changing action does to the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessPlan {
    /// The light is off: switch it on at `level`.
    PowerOn { level: usize },
    /// The light is on: move from one level to another.
    Step { from: usize, to: usize },
    /// Already at the boundary in the requested direction.
    AtBoundary { level: usize },
}

/// Decide what a brightness change means for a light in `state`.
#[must_use]
pub fn plan(state: &LightState, change: BrightnessChange, levels: &LightLevels) -> BrightnessPlan {
    let top = levels.top();
    if state.state != Power::On {
        let level = match change {
            BrightnessChange::Max => top,
            BrightnessChange::Up => POWER_ON_LEVEL.min(top),
            BrightnessChange::Down => 0,
        };
        return BrightnessPlan::PowerOn { level };
    }

    let current = levels.level_of(state);
    let target = match change {
        BrightnessChange::Up => (current + 1).min(top),
        BrightnessChange::Down => current.saturating_sub(1),
        BrightnessChange::Max => top,
    };
    if target == current {
        BrightnessPlan::AtBoundary { level: current }
    } else {
        BrightnessPlan::Step {
            from: current,
            to: target,
        }
    }
}

/// Consumes remote actions and drives the light (and plug).
pub struct BrightnessController<B> {
    context: Context<B>,
    config: BrightnessControllerConfig,
}

impl<B: Broker> BrightnessController<B> {
    pub fn new(context: Context<B>, config: BrightnessControllerConfig) -> Self {
        Self { context, config }
    }

    /// Listen to the remote until the connection goes away.
    ///
    /// Failures while handling a single action are logged and do not stop
    /// the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if subscribing fails or the inbound stream closes.
    pub async fn run(&self) -> Result<(), TradfriError> {
        let mut actions = self
            .context
            .subscribe::<RemoteActions>(&self.config.remote)
            .await?;
        tracing::info!(remote = %self.config.remote, "listening for remote actions");

        loop {
            let report = actions.next().await?;
            let Some(action) = report.action else {
                tracing::trace!(battery = report.battery, linkquality = report.linkquality, "remote telemetry");
                continue;
            };
            tracing::debug!(%action, "processing remote action");
            if let Err(err) = self.process_action(action).await {
                tracing::warn!(%action, %err, "failed to process remote action");
            }
        }
    }

    /// React to a single remote action.
    ///
    /// # Errors
    ///
    /// Returns an error if the light does not answer or a publish fails.
    pub async fn process_action(&self, action: RemoteAction) -> Result<(), TradfriError> {
        if action == RemoteAction::Toggle {
            self.context
                .send(&Command::Set {
                    device: self.config.light.clone(),
                    state: LightState::TOGGLE,
                })
                .await?;
            tracing::info!(light = %self.config.light, "light toggled");
            return Ok(());
        }

        if action.is_arrow_click() {
            let Some(plug) = &self.config.plug else {
                tracing::debug!(%action, "no plug configured, ignoring");
                return Ok(());
            };
            self.context
                .send(&Command::PlugToggle {
                    device: plug.clone(),
                })
                .await?;
            tracing::info!(%plug, "plug toggled");
            return Ok(());
        }

        match action.brightness_change() {
            Some(change) => self.change_brightness(change).await,
            None => {
                tracing::debug!(%action, "ignoring action");
                Ok(())
            }
        }
    }

    async fn change_brightness(&self, change: BrightnessChange) -> Result<(), TradfriError> {
        let light = &self.config.light;
        let report = self
            .context
            .request_once::<LightStates>(
                light,
                &Command::Get {
                    device: light.clone(),
                },
                self.config.reply_timeout,
            )
            .await?;
        if report.brightness.is_none() || report.color_temp.is_none() {
            tracing::debug!(%report, "light did not report its levels, assuming the defaults");
        }
        let state = report.or_levels_of(&LightState::DEFAULT);

        let level = match plan(&state, change, self.context.levels()) {
            BrightnessPlan::AtBoundary { level } => {
                tracing::info!(current_level = level, "brightness already at boundary, not doing anything");
                return Ok(());
            }
            BrightnessPlan::PowerOn { level } => {
                tracing::info!(%light, "light is off");
                // Must reach the coordinator before the light reports itself on.
                self.context
                    .send(&Command::suppress_next(&self.config.resetter))
                    .await?;
                level
            }
            BrightnessPlan::Step { to, .. } => to,
        };

        let target = self.context.levels().level(level);
        tracing::info!(
            new_level = level,
            brightness = target.brightness,
            color_temp = target.color_temp,
            "changing brightness"
        );
        self.context
            .send(&Command::Set {
                device: light.clone(),
                state: target.state(),
            })
            .await
    }
}
