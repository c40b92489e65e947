//! Topic scheme — how friendly names map onto broker topics.

use crate::error::ValidationError;

/// Namespaces under which device and control topics live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    /// Prefix of the device bridge (e.g. `zigbee2mqtt`).
    pub device_namespace: String,
    /// Prefix of inter-process control messages.
    pub control_namespace: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            device_namespace: "zigbee2mqtt".to_string(),
            control_namespace: "tradfri".to_string(),
        }
    }
}

impl TopicScheme {
    /// `{device_namespace}/{device}`: where a device reports its state.
    #[must_use]
    pub fn device(&self, device: &str) -> String {
        assert_topic_segment(device);
        format!("{}/{device}", self.device_namespace)
    }

    /// `{device_namespace}/{device}/{command}`.
    #[must_use]
    pub fn device_command(&self, device: &str, command: &str) -> String {
        assert_topic_segment(device);
        format!("{}/{device}/{command}", self.device_namespace)
    }

    /// `{control_namespace}/{device}`.
    #[must_use]
    pub fn control(&self, device: &str) -> String {
        assert_topic_segment(device);
        format!("{}/{device}", self.control_namespace)
    }

    /// The bridge log, shared by every device.
    #[must_use]
    pub fn bridge_log(&self) -> String {
        format!("{}/bridge/log", self.device_namespace)
    }
}

/// Check that a friendly name can be used as a single topic segment.
///
/// # Errors
///
/// Returns a [`ValidationError`] for empty names or names containing a topic
/// separator or wildcard.
pub fn validate_device_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyDeviceName);
    }
    if name.contains(['/', '+', '#']) {
        return Err(ValidationError::InvalidDeviceName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Names are validated when configuration is loaded; getting here with a bad
/// one is a wiring bug.
fn assert_topic_segment(device: &str) {
    assert!(
        validate_device_name(device).is_ok(),
        "invalid device name `{device}` reached topic resolution"
    );
}
