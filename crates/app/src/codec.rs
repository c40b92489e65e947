//! Message codec — maps commands onto `(topic, payload)` pairs and inbound
//! payloads onto typed events.
//!
//! Pure functions only; nothing here touches the broker.
//!
//! | Command | Topic | Payload |
//! |---------|-------|---------|
//! | `Set` | `{devices}/{name}/set` | `{"brightness", "state", "color_temp"}` |
//! | `Get` | `{devices}/{name}/get` | `{"state": ""}` |
//! | `PlugToggle` | `{devices}/{name}/set` | `{"state": "TOGGLE"}` |
//! | `Raw` | `{control}/{name}` | the message as a JSON string |

use serde::Deserialize;
use serde_json::{Value, json};

use tradfri_domain::announcement::DeviceAnnouncement;
use tradfri_domain::command::{Command, ControlSignal};
use tradfri_domain::error::DecodeError;
use tradfri_domain::light::{LightReport, Power};
use tradfri_domain::remote::RemoteAction;
use tradfri_domain::topic::TopicScheme;

const ANNOUNCE_MESSAGE: &str = "announce";
const ANNOUNCE_TYPE: &str = "device_announced";

/// An encoded command, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Encode a command for the given topic scheme.
#[must_use]
pub fn encode(command: &Command, topics: &TopicScheme) -> Outbound {
    let (topic, payload) = match command {
        Command::Set { device, state } => (
            topics.device_command(device, "set"),
            json!({
                "brightness": state.brightness,
                "state": state.state,
                "color_temp": state.color_temp,
            }),
        ),
        Command::Get { device } => (topics.device_command(device, "get"), json!({"state": ""})),
        Command::PlugToggle { device } => (
            topics.device_command(device, "set"),
            json!({"state": Power::Toggle}),
        ),
        Command::Raw { device, message } => {
            (topics.control(device), Value::String(message.clone()))
        }
    };
    Outbound {
        topic,
        payload: payload.to_string().into_bytes(),
    }
}

/// The semantic kinds of subscription, each bound to exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Button presses of a remote, on the remote's device topic.
    RemoteActions,
    /// State reports of a light, on the light's device topic.
    LightStates,
    /// Device announcements, on the shared bridge log.
    Announcements,
    /// Inter-process control messages, on the control topic.
    Control,
}

impl SubscriptionKind {
    /// Resolve the topic carrying this kind of message for `device`.
    #[must_use]
    pub fn topic(self, topics: &TopicScheme, device: &str) -> String {
        match self {
            Self::RemoteActions | Self::LightStates => topics.device(device),
            Self::Announcements => topics.bridge_log(),
            Self::Control => topics.control(device),
        }
    }

    /// Whether every payload on the topic must decode.
    ///
    /// The bridge log carries all sorts of unrelated messages, so
    /// announcement subscriptions skip anything they don't understand.
    #[must_use]
    pub fn has_fixed_shape(self) -> bool {
        !matches!(self, Self::Announcements)
    }
}

/// Type-level binding between a [`SubscriptionKind`] and the event it yields.
pub trait MessageKind: Send + 'static {
    /// Decoded event.
    type Event: Send + std::fmt::Debug;

    const KIND: SubscriptionKind;

    /// Validate and decode a raw payload addressed to `device`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the payload does not have the expected shape.
    fn decode(payload: &[u8], device: &str) -> Result<Self::Event, DecodeError>;
}

/// Remote reports.
pub struct RemoteActions;

/// Light state reports.
pub struct LightStates;

/// Bridge announcements.
pub struct Announcements;

/// Control messages.
pub struct ControlMessages;

/// A report from a remote. `action` is `None` for telemetry-only updates and
/// for actions that are not part of [`RemoteAction`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReport {
    pub battery: f64,
    pub linkquality: f64,
    pub action: Option<RemoteAction>,
}

#[derive(Deserialize)]
struct RawRemoteReport {
    battery: f64,
    linkquality: f64,
    #[serde(default)]
    action: Option<String>,
}

impl MessageKind for RemoteActions {
    type Event = RemoteReport;
    const KIND: SubscriptionKind = SubscriptionKind::RemoteActions;

    fn decode(payload: &[u8], _device: &str) -> Result<RemoteReport, DecodeError> {
        let raw: RawRemoteReport = serde_json::from_slice(payload)?;
        Ok(RemoteReport {
            battery: raw.battery,
            linkquality: raw.linkquality,
            action: raw.action.as_deref().and_then(RemoteAction::from_wire),
        })
    }
}

impl MessageKind for LightStates {
    type Event = LightReport;
    const KIND: SubscriptionKind = SubscriptionKind::LightStates;

    fn decode(payload: &[u8], _device: &str) -> Result<LightReport, DecodeError> {
        let report: LightReport = serde_json::from_slice(payload)?;
        if report.state == Power::Toggle {
            return Err(DecodeError::UnexpectedValue {
                field: "state",
                value: report.state.to_string(),
            });
        }
        Ok(report)
    }
}

impl MessageKind for Announcements {
    type Event = DeviceAnnouncement;
    const KIND: SubscriptionKind = SubscriptionKind::Announcements;

    fn decode(payload: &[u8], device: &str) -> Result<DeviceAnnouncement, DecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        expect_str(&value, "message", ANNOUNCE_MESSAGE)?;
        expect_str(&value, "type", ANNOUNCE_TYPE)?;
        let friendly_name = value
            .pointer("/meta/friendly_name")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingField("meta.friendly_name"))?;
        if friendly_name != device {
            return Err(DecodeError::ForeignDevice(friendly_name.to_string()));
        }
        Ok(DeviceAnnouncement {
            friendly_name: friendly_name.to_string(),
        })
    }
}

impl MessageKind for ControlMessages {
    type Event = ControlSignal;
    const KIND: SubscriptionKind = SubscriptionKind::Control;

    fn decode(payload: &[u8], _device: &str) -> Result<ControlSignal, DecodeError> {
        let message: String = serde_json::from_slice(payload)?;
        Ok(ControlSignal::parse(&message))
    }
}

fn expect_str(value: &Value, field: &'static str, expected: &str) -> Result<(), DecodeError> {
    match value.get(field) {
        None => Err(DecodeError::MissingField(field)),
        Some(found) if found.as_str() == Some(expected) => Ok(()),
        Some(found) => Err(DecodeError::UnexpectedValue {
            field,
            value: found.to_string(),
        }),
    }
}
