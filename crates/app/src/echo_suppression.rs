//! Echo-suppression coordinator — watches the light and puts it back to its
//! default levels when it powers on somewhere unexpected.
//!
//! The light remembers its last brightness and colour temperature across
//! power cycles. When it turns on with anything but the default pair the
//! coordinator publishes a corrective `Set`. The brightness controller powers
//! the light on at non-default levels on purpose; it announces that with a
//! `suppress-next` control message, which makes the coordinator accept the
//! next state change without correcting it.
//!
//! A pending suppression does not expire: if no state change follows, it
//! absorbs the first change after the light comes back.

use std::time::Duration;

use tradfri_domain::command::{Command, ControlSignal};
use tradfri_domain::error::TradfriError;
use tradfri_domain::light::{LightReport, LightState, Power};

use crate::codec::{Announcements, ControlMessages, LightStates};
use crate::context::Context;
use crate::ports::Broker;
use crate::subscriptions::Subscription;

/// Devices and timing for an [`EchoSuppressionCoordinator`].
#[derive(Debug, Clone)]
pub struct EchoSuppressionConfig {
    /// Light to watch.
    pub light: String,
    /// Name to receive control messages under.
    pub resetter: String,
    /// How long to wait for the first state during startup.
    pub baseline_timeout: Duration,
}

/// Tracking state of the coordinator. The transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baseline {
    #[default]
    NoBaseline,
    Tracking(LightReport),
}

/// What the coordinator made of a state report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First state seen; recorded as the baseline.
    Baseline,
    /// Same as the previous report; nothing to do.
    Duplicate,
    /// A change absorbed by a pending suppression.
    Suppressed,
    /// A change that needs no correction.
    Accepted,
    /// The light powered on at non-default levels.
    Correct,
}

/// Whether `next` is an anomalous power-on after `previous`.
///
/// A power-on that does not report both levels counts as non-default.
#[must_use]
pub fn is_anomaly(previous: &LightReport, next: &LightReport) -> bool {
    previous.state == Power::Off && next.state == Power::On && !next.has_default_levels()
}

/// The coordinator's decision logic, free of IO.
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    baseline: Baseline,
    suppress_next: bool,
}

impl EchoSuppressor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn baseline(&self) -> Baseline {
        self.baseline
    }

    #[must_use]
    pub fn suppression_pending(&self) -> bool {
        self.suppress_next
    }

    /// Skip the anomaly check for the next state change.
    pub fn suppress_next(&mut self) {
        self.suppress_next = true;
    }

    /// Feed a state report and decide what to do about it.
    pub fn observe(&mut self, report: impl Into<LightReport>) -> Decision {
        let state = report.into();
        let Baseline::Tracking(last) = self.baseline else {
            self.baseline = Baseline::Tracking(state);
            return Decision::Baseline;
        };
        if last == state {
            return Decision::Duplicate;
        }

        let decision = if self.suppress_next {
            self.suppress_next = false;
            Decision::Suppressed
        } else if is_anomaly(&last, &state) {
            Decision::Correct
        } else {
            Decision::Accepted
        };
        self.baseline = Baseline::Tracking(state);
        decision
    }
}

/// What a single [`EchoSuppressionCoordinator::step`] handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    State(Decision),
    Announcement,
    Control(ControlSignal),
}

/// Watches light state, announcements and control messages for one light.
pub struct EchoSuppressionCoordinator<B: Broker> {
    context: Context<B>,
    config: EchoSuppressionConfig,
    suppressor: EchoSuppressor,
    states: Subscription<LightStates, B>,
    announcements: Subscription<Announcements, B>,
    control: Subscription<ControlMessages, B>,
}

impl<B: Broker> EchoSuppressionCoordinator<B> {
    /// Subscribe, ask the light for its state and wait for the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`TradfriError::NoBaseline`] when the light does not report
    /// within the configured timeout, or any broker error.
    pub async fn start(
        context: Context<B>,
        config: EchoSuppressionConfig,
    ) -> Result<Self, TradfriError> {
        let mut states = context.subscribe::<LightStates>(&config.light).await?;
        let announcements = context.subscribe::<Announcements>(&config.light).await?;
        let control = context.subscribe::<ControlMessages>(&config.resetter).await?;

        tracing::info!(light = %config.light, "getting the first state");
        context
            .send(&Command::Get {
                device: config.light.clone(),
            })
            .await?;

        let first = tokio::time::timeout(config.baseline_timeout, states.next())
            .await
            .map_err(|_| TradfriError::NoBaseline {
                waited: config.baseline_timeout,
            })??;
        tracing::info!(state = %first, "got first state");

        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(first);

        Ok(Self {
            context,
            config,
            suppressor,
            states,
            announcements,
            control,
        })
    }

    /// Current decision state.
    #[must_use]
    pub fn suppressor(&self) -> &EchoSuppressor {
        &self.suppressor
    }

    /// Handle events until the connection goes away.
    ///
    /// # Errors
    ///
    /// Returns [`TradfriError::ConnectionClosed`] once the inbound stream ends.
    pub async fn run(mut self) -> Result<(), TradfriError> {
        tracing::info!(light = %self.config.light, "listening for events");
        loop {
            match self.step().await {
                Ok(_) => {}
                Err(TradfriError::ConnectionClosed) => return Err(TradfriError::ConnectionClosed),
                Err(err) => tracing::warn!(%err, "failed to handle event"),
            }
        }
    }

    /// Wait for the next event and handle it.
    ///
    /// Control messages are looked at first, so a suppression published just
    /// before a state change is always in place when that change is handled.
    ///
    /// # Errors
    ///
    /// Returns an error if a corrective publish fails or the stream closes.
    pub async fn step(&mut self) -> Result<Reaction, TradfriError> {
        tokio::select! {
            biased;
            signal = self.control.next() => {
                let signal = signal?;
                self.on_control(&signal);
                Ok(Reaction::Control(signal))
            }
            announcement = self.announcements.next() => {
                let announcement = announcement?;
                tracing::info!(device = %announcement.friendly_name, "device was powered on");
                self.reset().await?;
                Ok(Reaction::Announcement)
            }
            state = self.states.next() => {
                let decision = self.on_state(state?).await?;
                Ok(Reaction::State(decision))
            }
        }
    }

    async fn on_state(&mut self, state: LightReport) -> Result<Decision, TradfriError> {
        let previous = self.suppressor.baseline();
        let decision = self.suppressor.observe(state);
        if let (Baseline::Tracking(previous), Decision::Suppressed | Decision::Accepted | Decision::Correct) =
            (previous, decision)
        {
            tracing::info!(from = %previous, to = %state, "new state");
        }
        match decision {
            Decision::Duplicate => tracing::trace!("duplicate state"),
            Decision::Baseline => tracing::info!(%state, "baseline recorded"),
            Decision::Suppressed => tracing::info!("ignoring: suppression requested"),
            Decision::Accepted => tracing::debug!("no correction needed"),
            Decision::Correct => {
                tracing::info!("the light turned on with non-default brightness/color_temp");
                self.reset().await?;
            }
        }
        Ok(decision)
    }

    fn on_control(&mut self, signal: &ControlSignal) {
        match signal {
            ControlSignal::SuppressNext => {
                tracing::info!("next light state will be ignored");
                self.suppressor.suppress_next();
            }
            ControlSignal::Unrecognized(message) => {
                tracing::warn!(%message, "control message not understood");
            }
        }
    }

    async fn reset(&self) -> Result<(), TradfriError> {
        tracing::info!(light = %self.config.light, "resetting light");
        self.context
            .send(&Command::Set {
                device: self.config.light.clone(),
                state: LightState::DEFAULT,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tradfri_domain::level::LightLevels;
    use tradfri_domain::topic::TopicScheme;

    use crate::in_process_broker::InProcessBroker;

    const LIGHT: &str = "zigbee2mqtt/ikea";
    const LIGHT_SET: &str = "zigbee2mqtt/ikea/set";

    fn off(brightness: u16, color_temp: u16) -> LightState {
        LightState {
            state: Power::Off,
            brightness,
            color_temp,
        }
    }

    fn report(state: LightState) -> Vec<u8> {
        serde_json::to_vec(&state).unwrap()
    }

    fn config() -> EchoSuppressionConfig {
        EchoSuppressionConfig {
            light: "ikea".to_string(),
            resetter: "light-resetter".to_string(),
            baseline_timeout: Duration::from_secs(10),
        }
    }

    fn context() -> (Arc<InProcessBroker>, Context<InProcessBroker>) {
        let broker = Arc::new(InProcessBroker::new(32));
        let (context, _violations) = Context::new(
            Arc::clone(&broker),
            TopicScheme::default(),
            LightLevels::default(),
            8,
        );
        (broker, context)
    }

    /// Start a coordinator whose light answers the startup `get` with `baseline`.
    async fn started(
        baseline: LightState,
    ) -> (Arc<InProcessBroker>, EchoSuppressionCoordinator<InProcessBroker>) {
        let (broker, context) = context();
        let responder = {
            let broker = Arc::clone(&broker);
            let mut outgoing = broker.outgoing();
            tokio::spawn(async move {
                while let Ok(message) = outgoing.recv().await {
                    if message.topic == "zigbee2mqtt/ikea/get" {
                        broker.inject(LIGHT, report(baseline));
                        break;
                    }
                }
            })
        };
        let coordinator = EchoSuppressionCoordinator::start(context, config())
            .await
            .unwrap();
        responder.await.unwrap();
        (broker, coordinator)
    }

    fn corrections(broker: &InProcessBroker) -> usize {
        broker.published_on(LIGHT_SET).len()
    }

    // ── EchoSuppressor ─────────────────────────────────────────────

    #[test]
    fn should_record_first_state_as_baseline() {
        let mut suppressor = EchoSuppressor::new();
        assert_eq!(suppressor.baseline(), Baseline::NoBaseline);
        assert_eq!(suppressor.observe(off(100, 400)), Decision::Baseline);
        assert_eq!(suppressor.baseline(), Baseline::Tracking(off(100, 400).into()));
    }

    #[test]
    fn should_ignore_duplicate_states() {
        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(off(100, 400));
        suppressor.suppress_next();

        assert_eq!(suppressor.observe(off(100, 400)), Decision::Duplicate);
        assert_eq!(suppressor.baseline(), Baseline::Tracking(off(100, 400).into()));
        assert!(suppressor.suppression_pending());
    }

    #[test]
    fn should_flag_power_on_at_non_default_levels() {
        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(off(100, 400));
        assert_eq!(
            suppressor.observe(LightState::on(100, 400)),
            Decision::Correct
        );
        assert_eq!(
            suppressor.baseline(),
            Baseline::Tracking(LightState::on(100, 400).into())
        );
    }

    #[test]
    fn should_accept_power_on_at_default_levels() {
        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(off(100, 400));
        assert_eq!(suppressor.observe(LightState::DEFAULT), Decision::Accepted);
    }

    #[test]
    fn should_accept_changes_while_on() {
        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(LightState::DEFAULT);
        assert_eq!(
            suppressor.observe(LightState::on(25, 454)),
            Decision::Accepted
        );
        assert_eq!(suppressor.observe(off(25, 454)), Decision::Accepted);
    }

    #[test]
    fn should_absorb_exactly_one_change_after_suppression() {
        let mut suppressor = EchoSuppressor::new();
        suppressor.observe(off(100, 400));
        suppressor.suppress_next();

        assert_eq!(
            suppressor.observe(LightState::on(25, 454)),
            Decision::Suppressed
        );
        assert!(!suppressor.suppression_pending());

        suppressor.observe(off(25, 454));
        assert_eq!(
            suppressor.observe(LightState::on(25, 454)),
            Decision::Correct
        );
    }

    #[test]
    fn should_never_flag_change_after_suppression_from_off() {
        for (brightness, color_temp) in [(0, 250), (25, 454), (127, 500), (254, 250)] {
            let mut suppressor = EchoSuppressor::new();
            suppressor.observe(off(100, 400));
            suppressor.suppress_next();
            let decision = suppressor.observe(LightState::on(brightness, color_temp));
            assert_eq!(decision, Decision::Suppressed);
        }
    }

    // ── EchoSuppressionCoordinator ─────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn should_fail_fatally_without_baseline() {
        let (broker, context) = context();
        let result = EchoSuppressionCoordinator::start(context, config()).await;

        assert!(matches!(
            result,
            Err(TradfriError::NoBaseline { waited }) if waited == Duration::from_secs(10)
        ));
        assert_eq!(broker.published_on("zigbee2mqtt/ikea/get").len(), 1);
    }

    #[tokio::test]
    async fn should_subscribe_to_all_three_topics_on_start() {
        let (broker, coordinator) = started(off(100, 400)).await;

        assert!(broker.is_subscribed(LIGHT));
        assert!(broker.is_subscribed("zigbee2mqtt/bridge/log"));
        assert!(broker.is_subscribed("tradfri/light-resetter"));
        assert_eq!(
            coordinator.suppressor().baseline(),
            Baseline::Tracking(off(100, 400).into())
        );
    }

    #[tokio::test]
    async fn should_reset_anomalous_power_on() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker.inject(LIGHT, report(LightState::on(100, 400)));
        let reaction = coordinator.step().await.unwrap();

        assert_eq!(reaction, Reaction::State(Decision::Correct));
        let sets = broker.published_on(LIGHT_SET);
        assert_eq!(sets.len(), 1);
        let payload: serde_json::Value = serde_json::from_slice(&sets[0]).unwrap();
        assert_eq!(
            payload,
            json!({"brightness": 254, "state": "ON", "color_temp": 350})
        );
    }

    #[tokio::test]
    async fn should_not_reset_default_power_on() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker.inject(LIGHT, report(LightState::DEFAULT));
        let reaction = coordinator.step().await.unwrap();

        assert_eq!(reaction, Reaction::State(Decision::Accepted));
        assert_eq!(corrections(&broker), 0);
    }

    #[tokio::test]
    async fn should_take_no_action_on_duplicates() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker.inject(LIGHT, report(off(100, 400)));
        let reaction = coordinator.step().await.unwrap();

        assert_eq!(reaction, Reaction::State(Decision::Duplicate));
        assert_eq!(corrections(&broker), 0);
        assert_eq!(
            coordinator.suppressor().baseline(),
            Baseline::Tracking(off(100, 400).into())
        );
    }

    #[tokio::test]
    async fn should_reset_on_every_announcement() {
        let (broker, mut coordinator) = started(LightState::DEFAULT).await;
        let announce = br#"{"message":"announce","type":"device_announced","meta":{"friendly_name":"ikea"}}"#;

        broker.inject("zigbee2mqtt/bridge/log", announce.to_vec());
        assert_eq!(coordinator.step().await.unwrap(), Reaction::Announcement);
        broker.inject("zigbee2mqtt/bridge/log", announce.to_vec());
        assert_eq!(coordinator.step().await.unwrap(), Reaction::Announcement);

        assert_eq!(corrections(&broker), 2);
    }

    #[tokio::test]
    async fn should_honour_suppression_handshake() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker
            .publish("tradfri/light-resetter", br#""suppress-next""#.to_vec())
            .await
            .unwrap();
        broker.inject(LIGHT, report(LightState::on(25, 454)));

        assert_eq!(
            coordinator.step().await.unwrap(),
            Reaction::Control(ControlSignal::SuppressNext)
        );
        assert_eq!(
            coordinator.step().await.unwrap(),
            Reaction::State(Decision::Suppressed)
        );
        assert_eq!(corrections(&broker), 0);
    }

    #[tokio::test]
    async fn should_ignore_unrecognized_control_message() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker
            .publish("tradfri/light-resetter", br#""supress-next""#.to_vec())
            .await
            .unwrap();

        assert_eq!(
            coordinator.step().await.unwrap(),
            Reaction::Control(ControlSignal::Unrecognized("supress-next".to_string()))
        );
        assert!(!coordinator.suppressor().suppression_pending());
    }

    #[tokio::test]
    async fn should_reset_power_on_reported_without_levels() {
        let (broker, mut coordinator) = started(off(100, 400)).await;

        broker.inject(LIGHT, br#"{"state":"ON"}"#.to_vec());
        let reaction = coordinator.step().await.unwrap();

        assert_eq!(reaction, Reaction::State(Decision::Correct));
        assert_eq!(corrections(&broker), 1);
    }

    #[test]
    fn should_track_reports_missing_levels() {
        let mut suppressor = EchoSuppressor::new();
        let power_only = LightReport {
            state: Power::Off,
            brightness: None,
            color_temp: None,
        };
        assert_eq!(suppressor.observe(power_only), Decision::Baseline);
        assert_eq!(suppressor.observe(power_only), Decision::Duplicate);
        assert_eq!(suppressor.observe(LightState::DEFAULT), Decision::Accepted);
    }
}
