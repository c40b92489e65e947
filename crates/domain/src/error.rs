//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`TradfriError`]
//! via `#[from]` when crossing a port boundary.

use std::time::Duration;

/// Top-level error for the tradfri control layer.
#[derive(Debug, thiserror::Error)]
pub enum TradfriError {
    /// A command was rejected before anything was published.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// No light state arrived during startup, so there is nothing to compare
    /// later reports against.
    #[error("no baseline light state received within {waited:?}")]
    NoBaseline {
        /// How long the coordinator waited.
        waited: Duration,
    },

    /// A one-shot request got no reply in time.
    #[error("no reply on `{topic}` within {waited:?}")]
    ReplyTimeout {
        /// Topic the reply was expected on.
        topic: String,
        /// How long the request waited.
        waited: Duration,
    },

    /// The shared inbound stream ended.
    #[error("broker connection closed")]
    ConnectionClosed,

    /// The broker client reported a failure.
    #[error("broker error")]
    Broker(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Brightness outside `[0, 254]`.
    #[error("brightness must be within 0 and 254, got {value}")]
    BrightnessOutOfRange {
        /// The rejected value.
        value: u16,
    },

    /// An empty device friendly name.
    #[error("device name must not be empty")]
    EmptyDeviceName,

    /// A friendly name that would change the topic structure.
    #[error("device name `{name}` must not contain `/`, `+` or `#`")]
    InvalidDeviceName {
        /// The rejected name.
        name: String,
    },
}

/// Why an inbound payload could not be decoded into a typed event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the expected schema.
    #[error("malformed payload")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field holds a value that is not allowed here.
    #[error("unexpected value for `{field}`: {value}")]
    UnexpectedValue {
        /// The offending field.
        field: &'static str,
        /// What was found.
        value: String,
    },

    /// A well-formed message about some other device.
    #[error("message concerns device `{0}`")]
    ForeignDevice(String),
}

/// A decode failure on a topic that is supposed to carry a known shape.
#[derive(Debug, thiserror::Error)]
#[error("protocol violation on `{topic}`")]
pub struct ProtocolViolation {
    /// Topic the payload arrived on.
    pub topic: String,
    /// The underlying decode failure.
    #[source]
    pub source: DecodeError,
}

impl TradfriError {
    /// Wrap any broker client failure.
    pub fn broker(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Broker(Box::new(err))
    }
}
