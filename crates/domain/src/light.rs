//! Light state — power, brightness and colour temperature of a dimmable light.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Highest brightness the bridge accepts.
pub const MAX_BRIGHTNESS: u16 = 254;

/// Colour temperature the light should come up with (mired).
pub const DEFAULT_COLOR_TEMP: u16 = 350;

/// Power state of a light, either reported or desired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    On,
    Off,
    /// Only meaningful as a desired value.
    Toggle,
}

impl std::fmt::Display for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("ON"),
            Self::Off => f.write_str("OFF"),
            Self::Toggle => f.write_str("TOGGLE"),
        }
    }
}

/// Snapshot of a light. Field order matches the `set` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightState {
    pub brightness: u16,
    pub state: Power,
    pub color_temp: u16,
}

impl LightState {
    /// Full brightness at the neutral colour temperature, powered on.
    pub const DEFAULT: Self = Self {
        brightness: MAX_BRIGHTNESS,
        state: Power::On,
        color_temp: DEFAULT_COLOR_TEMP,
    };

    /// The fixed command sent when the remote's toggle button is pressed.
    pub const TOGGLE: Self = Self {
        brightness: MAX_BRIGHTNESS,
        state: Power::Toggle,
        color_temp: DEFAULT_COLOR_TEMP,
    };

    /// A powered-on state at the given brightness and colour temperature.
    #[must_use]
    pub fn on(brightness: u16, color_temp: u16) -> Self {
        Self {
            brightness,
            state: Power::On,
            color_temp,
        }
    }

    /// Whether brightness and colour temperature are the default pair.
    #[must_use]
    pub fn has_default_levels(&self) -> bool {
        self.brightness == MAX_BRIGHTNESS && self.color_temp == DEFAULT_COLOR_TEMP
    }

    /// Check the state before it is sent to a device.
    ///
    /// Colour temperature is deliberately not range-checked.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BrightnessOutOfRange`] when brightness
    /// exceeds [`MAX_BRIGHTNESS`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.brightness > MAX_BRIGHTNESS {
            return Err(ValidationError::BrightnessOutOfRange {
                value: self.brightness,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for LightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state: {}, brightness: {}, color_temp: {}",
            self.state, self.brightness, self.color_temp
        )
    }
}

/// A state report as published by a light.
///
/// Only `state` is guaranteed; bridges omit or null out the levels while a
/// light is unreachable or still interviewing. Missing levels never count as
/// the default pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightReport {
    pub state: Power,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u16>,
}

impl LightReport {
    /// Whether both levels were reported and are the default pair.
    #[must_use]
    pub fn has_default_levels(&self) -> bool {
        self.brightness == Some(MAX_BRIGHTNESS) && self.color_temp == Some(DEFAULT_COLOR_TEMP)
    }

    /// The reported state, with missing levels taken from `fallback`.
    #[must_use]
    pub fn or_levels_of(&self, fallback: &LightState) -> LightState {
        LightState {
            brightness: self.brightness.unwrap_or(fallback.brightness),
            state: self.state,
            color_temp: self.color_temp.unwrap_or(fallback.color_temp),
        }
    }
}

impl From<LightState> for LightReport {
    fn from(state: LightState) -> Self {
        Self {
            state: state.state,
            brightness: Some(state.brightness),
            color_temp: Some(state.color_temp),
        }
    }
}

impl std::fmt::Display for LightReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn level(value: Option<u16>) -> String {
            value.map_or_else(|| "-".to_string(), |value| value.to_string())
        }
        write!(
            f,
            "state: {}, brightness: {}, color_temp: {}",
            self.state,
            level(self.brightness),
            level(self.color_temp)
        )
    }
}
