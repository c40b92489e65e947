//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `tradfri.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;
use tradfri_adapter_mqtt::MqttConfig;
use tradfri_app::brightness_controller::BrightnessControllerConfig;
use tradfri_app::echo_suppression::EchoSuppressionConfig;
use tradfri_domain::command::Command;
use tradfri_domain::light::{DEFAULT_COLOR_TEMP, LightState, MAX_BRIGHTNESS, Power};
use tradfri_domain::topic::{TopicScheme, validate_device_name};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Topic namespaces.
    pub topics: TopicsConfig,
    /// Friendly names of the devices involved.
    pub devices: DevicesConfig,
    /// Brightness controller settings.
    pub remote: RemoteConfig,
    /// Echo-suppression coordinator settings.
    pub resetter: ResetterConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Target of the one-shot `tradfri-set` command.
    pub set: SetConfig,
}

/// Topic namespaces.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Prefix of the device bridge.
    pub device_namespace: String,
    /// Prefix of control messages between the components.
    pub control_namespace: String,
}

/// Device friendly names.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub light: String,
    pub remote: String,
    /// Plug toggled by the arrow buttons, if any.
    pub plug: Option<String>,
    /// Name the coordinator receives control messages under.
    pub resetter: String,
}

/// Brightness controller settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    /// How long to wait for the light to answer a `get`, in seconds.
    pub reply_timeout_secs: u64,
}

/// Echo-suppression coordinator settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ResetterConfig {
    pub enabled: bool,
    /// How long to wait for the first light state on startup, in seconds.
    pub baseline_timeout_secs: u64,
}

/// State `tradfri-set` sends to the light.
///
/// Brightness is checked when the command is sent, not here.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SetConfig {
    pub state: Power,
    pub brightness: u16,
    pub color_temp: u16,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `tradfri.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("tradfri.toml")?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = var("TRADFRI_BROKER") {
            match val.rsplit_once(':') {
                Some((host, port)) => {
                    self.mqtt.broker_host = host.to_string();
                    if let Ok(port) = port.parse() {
                        self.mqtt.broker_port = port;
                    }
                }
                None => self.mqtt.broker_host = val,
            }
        }
        if let Some(val) = var("TRADFRI_LIGHT") {
            self.devices.light = val;
        }
        if let Some(val) = var("TRADFRI_REMOTE") {
            self.devices.remote = val;
        }
        if let Some(val) = var("TRADFRI_PLUG") {
            self.devices.plug = Some(val);
        }
        if let Some(val) = var("TRADFRI_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("TRADFRI_SET_STATE") {
            self.set.state = parse_power(&val)?;
        }
        if let Some(val) = var("TRADFRI_SET_BRIGHTNESS") {
            self.set.brightness = parse_number("TRADFRI_SET_BRIGHTNESS", &val)?;
        }
        if let Some(val) = var("TRADFRI_SET_COLOR_TEMP") {
            self.set.color_temp = parse_number("TRADFRI_SET_COLOR_TEMP", &val)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "broker port must be non-zero".to_string(),
            ));
        }
        if self.mqtt.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "channel capacity must be non-zero".to_string(),
            ));
        }
        for namespace in [&self.topics.device_namespace, &self.topics.control_namespace] {
            if namespace.is_empty() || namespace.contains(['+', '#']) {
                return Err(ConfigError::Validation(format!(
                    "invalid topic namespace {namespace:?}"
                )));
            }
        }
        let devices = [
            &self.devices.light,
            &self.devices.remote,
            &self.devices.resetter,
        ];
        for name in devices.into_iter().chain(self.devices.plug.as_ref()) {
            validate_device_name(name)
                .map_err(|err| ConfigError::Validation(err.to_string()))?;
        }
        if self.remote.reply_timeout_secs == 0 || self.resetter.baseline_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeouts must be non-zero".to_string(),
            ));
        }
        if !self.remote.enabled && !self.resetter.enabled {
            return Err(ConfigError::Validation(
                "at least one of remote or resetter must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn topic_scheme(&self) -> TopicScheme {
        TopicScheme {
            device_namespace: self.topics.device_namespace.clone(),
            control_namespace: self.topics.control_namespace.clone(),
        }
    }

    #[must_use]
    pub fn controller(&self) -> BrightnessControllerConfig {
        BrightnessControllerConfig {
            light: self.devices.light.clone(),
            remote: self.devices.remote.clone(),
            plug: self.devices.plug.clone(),
            resetter: self.devices.resetter.clone(),
            reply_timeout: Duration::from_secs(self.remote.reply_timeout_secs),
        }
    }

    /// The command `tradfri-set` publishes.
    #[must_use]
    pub fn set_command(&self) -> Command {
        Command::Set {
            device: self.devices.light.clone(),
            state: LightState {
                brightness: self.set.brightness,
                state: self.set.state,
                color_temp: self.set.color_temp,
            },
        }
    }

    #[must_use]
    pub fn coordinator(&self) -> EchoSuppressionConfig {
        EchoSuppressionConfig {
            light: self.devices.light.clone(),
            resetter: self.devices.resetter.clone(),
            baseline_timeout: Duration::from_secs(self.resetter.baseline_timeout_secs),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        let scheme = TopicScheme::default();
        Self {
            device_namespace: scheme.device_namespace,
            control_namespace: scheme.control_namespace,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            light: "ikea".to_string(),
            remote: "remote".to_string(),
            plug: None,
            resetter: "light-resetter".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reply_timeout_secs: 5,
        }
    }
}

impl Default for ResetterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_timeout_secs: 10,
        }
    }
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            state: Power::Toggle,
            brightness: MAX_BRIGHTNESS,
            color_temp: DEFAULT_COLOR_TEMP,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tradfrid=info,tradfri=info".to_string(),
        }
    }
}

fn parse_power(value: &str) -> Result<Power, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(Power::On),
        "off" => Ok(Power::Off),
        "toggle" => Ok(Power::Toggle),
        other => Err(ConfigError::Validation(format!(
            "TRADFRI_SET_STATE must be on, off or toggle, got {other:?}"
        ))),
    }
}

fn parse_number(name: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{name} is not a number: {value:?}")))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.mqtt.broker_host, "localhost");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.devices.light, "ikea");
        assert_eq!(config.devices.remote, "remote");
        assert_eq!(config.devices.plug, None);
        assert_eq!(config.devices.resetter, "light-resetter");
        assert_eq!(config.topic_scheme(), TopicScheme::default());
        assert!(config.remote.enabled);
        assert!(config.resetter.enabled);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [mqtt]
            broker_host = '10.0.0.2'
            broker_port = 1884
            client_id = 'bedroom'

            [topics]
            device_namespace = 'z2m'
            control_namespace = 'ctl'

            [devices]
            light = 'bedroom-light'
            remote = 'bedroom-remote'
            plug = 'fan'
            resetter = 'bedroom-resetter'

            [remote]
            enabled = false
            reply_timeout_secs = 2

            [resetter]
            baseline_timeout_secs = 20

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.broker_host, "10.0.0.2");
        assert_eq!(config.mqtt.broker_port, 1884);
        assert_eq!(config.mqtt.client_id, "bedroom");
        assert_eq!(config.topic_scheme().device("x"), "z2m/x");
        assert_eq!(config.topic_scheme().control("x"), "ctl/x");
        assert_eq!(config.devices.plug.as_deref(), Some("fan"));
        assert!(!config.remote.enabled);
        assert_eq!(config.controller().reply_timeout, Duration::from_secs(2));
        assert_eq!(config.controller().light, "bedroom-light");
        assert_eq!(
            config.coordinator().baseline_timeout,
            Duration::from_secs(20)
        );
        assert_eq!(config.coordinator().resetter, "bedroom-resetter");
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.devices.light, "ikea");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }

    #[test]
    fn should_apply_broker_address_override() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("TRADFRI_BROKER", "mqtt.lan:1884")])).unwrap();
        assert_eq!(config.mqtt.broker_host, "mqtt.lan");
        assert_eq!(config.mqtt.broker_port, 1884);
    }

    #[test]
    fn should_accept_broker_host_without_port() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("TRADFRI_BROKER", "mqtt.lan")])).unwrap();
        assert_eq!(config.mqtt.broker_host, "mqtt.lan");
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_apply_device_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("TRADFRI_LIGHT", "lamp"),
            ("TRADFRI_REMOTE", "dimmer"),
            ("TRADFRI_PLUG", "heater"),
        ])).unwrap();
        assert_eq!(config.devices.light, "lamp");
        assert_eq!(config.devices.remote, "dimmer");
        assert_eq!(config.devices.plug.as_deref(), Some("heater"));
    }

    #[test]
    fn should_prefer_rust_log_over_tradfri_log() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("TRADFRI_LOG", "warn"), ("RUST_LOG", "trace")])).unwrap();
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.mqtt.broker_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_wildcards_in_device_names() {
        let mut config = Config::default();
        config.devices.light = "lights/+".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.devices.plug = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_wildcard_namespace() {
        let mut config = Config::default();
        config.topics.device_namespace = "#".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_timeouts() {
        let mut config = Config::default();
        config.resetter.baseline_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_when_everything_disabled() {
        let mut config = Config::default();
        config.remote.enabled = false;
        config.resetter.enabled = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_reject_zero_channel_capacity() {
        let config: Config = toml::from_str("[mqtt]\nchannel_capacity = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn should_default_set_command_to_toggle() {
        let config = Config::default();
        assert_eq!(
            config.set_command(),
            Command::Set {
                device: "ikea".to_string(),
                state: LightState::TOGGLE,
            }
        );
    }

    #[test]
    fn should_parse_set_section() {
        let toml = "
            [devices]
            light = 'desk'

            [set]
            state = 'ON'
            brightness = 80
            color_temp = 454
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.set_command(),
            Command::Set {
                device: "desk".to_string(),
                state: LightState::on(80, 454),
            }
        );
    }

    #[test]
    fn should_apply_set_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("TRADFRI_SET_STATE", "Off"),
                ("TRADFRI_SET_BRIGHTNESS", "12"),
                ("TRADFRI_SET_COLOR_TEMP", "500"),
            ]))
            .unwrap();
        assert_eq!(config.set.state, Power::Off);
        assert_eq!(config.set.brightness, 12);
        assert_eq!(config.set.color_temp, 500);
    }

    #[test]
    fn should_reject_non_numeric_set_brightness() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("TRADFRI_SET_BRIGHTNESS", "bright")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_unknown_set_state() {
        let mut config = Config::default();
        let result = config.apply_overrides(env(&[("TRADFRI_SET_STATE", "dim")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
