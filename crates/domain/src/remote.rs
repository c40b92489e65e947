//! Remote control actions reported by the bridge.

use serde::{Deserialize, Serialize};

/// Button action of a remote control.
///
/// `toggle_hold` is not part of this set: the remote always sends it right
/// after `toggle` and never sends a matching release, so it is indistinguishable
/// from noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAction {
    Toggle,
    On,
    Off,
    BrightnessUpClick,
    BrightnessUpHold,
    BrightnessUpRelease,
    BrightnessDownClick,
    BrightnessDownHold,
    BrightnessDownRelease,
    ArrowLeftClick,
    ArrowLeftHold,
    ArrowLeftRelease,
    ArrowRightClick,
    ArrowRightHold,
    ArrowRightRelease,
}

/// Which way a brightness-changing action moves the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrightnessChange {
    /// One level up.
    Up,
    /// One level down.
    Down,
    /// Straight to the top level.
    Max,
}

impl RemoteAction {
    /// Every recognised action, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::Toggle,
        Self::On,
        Self::Off,
        Self::BrightnessUpClick,
        Self::BrightnessUpHold,
        Self::BrightnessUpRelease,
        Self::BrightnessDownClick,
        Self::BrightnessDownHold,
        Self::BrightnessDownRelease,
        Self::ArrowLeftClick,
        Self::ArrowLeftHold,
        Self::ArrowLeftRelease,
        Self::ArrowRightClick,
        Self::ArrowRightHold,
        Self::ArrowRightRelease,
    ];

    /// Wire name used by the bridge.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::On => "on",
            Self::Off => "off",
            Self::BrightnessUpClick => "brightness_up_click",
            Self::BrightnessUpHold => "brightness_up_hold",
            Self::BrightnessUpRelease => "brightness_up_release",
            Self::BrightnessDownClick => "brightness_down_click",
            Self::BrightnessDownHold => "brightness_down_hold",
            Self::BrightnessDownRelease => "brightness_down_release",
            Self::ArrowLeftClick => "arrow_left_click",
            Self::ArrowLeftHold => "arrow_left_hold",
            Self::ArrowLeftRelease => "arrow_left_release",
            Self::ArrowRightClick => "arrow_right_click",
            Self::ArrowRightHold => "arrow_right_hold",
            Self::ArrowRightRelease => "arrow_right_release",
        }
    }

    /// Look up an action by wire name. Unknown names yield `None`.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == name)
    }

    /// How this action changes brightness, if it does.
    #[must_use]
    pub fn brightness_change(self) -> Option<BrightnessChange> {
        match self {
            Self::BrightnessUpClick | Self::On => Some(BrightnessChange::Up),
            Self::BrightnessDownClick | Self::Off => Some(BrightnessChange::Down),
            Self::BrightnessUpHold => Some(BrightnessChange::Max),
            _ => None,
        }
    }

    /// Whether this action toggles the plug.
    #[must_use]
    pub fn is_arrow_click(self) -> bool {
        matches!(self, Self::ArrowLeftClick | Self::ArrowRightClick)
    }
}

impl std::fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
