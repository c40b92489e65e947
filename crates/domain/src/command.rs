//! Outbound commands and inter-process control signals.

use crate::light::LightState;

/// Wire value of the suppression handshake.
pub const SUPPRESS_NEXT: &str = "suppress-next";

/// A message addressed to a device (or to another process by name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the desired light state.
    Set { device: String, state: LightState },
    /// Ask the device to report its current state.
    Get { device: String },
    /// Flip a power plug.
    PlugToggle { device: String },
    /// Free-form control message for another process.
    Raw { device: String, message: String },
}

impl Command {
    /// The friendly name this command is addressed to.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::Set { device, .. }
            | Self::Get { device }
            | Self::PlugToggle { device }
            | Self::Raw { device, .. } => device,
        }
    }

    /// Ask the named peer to skip its next anomaly check.
    #[must_use]
    pub fn suppress_next(device: impl Into<String>) -> Self {
        Self::Raw {
            device: device.into(),
            message: SUPPRESS_NEXT.to_string(),
        }
    }
}

/// An inbound control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// Skip the anomaly check for the next state change.
    SuppressNext,
    /// Anything else; logged and ignored.
    Unrecognized(String),
}

impl ControlSignal {
    #[must_use]
    pub fn parse(message: &str) -> Self {
        if message == SUPPRESS_NEXT {
            Self::SuppressNext
        } else {
            Self::Unrecognized(message.to_string())
        }
    }
}
