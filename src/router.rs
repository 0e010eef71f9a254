use crate::actuators::{ActuatorId, ActuatorRegistry};
use crate::config::FeedConfig;
use crate::journal::{JournalRecord, StatusRecorder};
use crate::mode::ModeStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Maps inbound (topic, payload) pairs to actuator or mode mutations.
///
/// All applications are absolute sets, so duplicate delivery of the same
/// command is idempotent. Unrecognized topics and malformed payloads are
/// logged and ignored; they never disturb state.
pub struct CommandRouter {
    registry: Arc<ActuatorRegistry>,
    mode: Arc<ModeStore>,
    recorder: Arc<StatusRecorder>,
    feeds: FeedConfig,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<ActuatorRegistry>,
        mode: Arc<ModeStore>,
        recorder: Arc<StatusRecorder>,
        feeds: FeedConfig,
    ) -> Self {
        Self {
            registry,
            mode,
            recorder,
            feeds,
        }
    }

    /// Entry point invoked from the network task for every inbound message.
    pub fn handle(&self, topic: &str, payload: &str) {
        if topic == self.feeds.light_control {
            self.apply_actuator(ActuatorId::LedLight, topic, payload);
        } else if topic == self.feeds.fan_control {
            self.apply_actuator(ActuatorId::FanRelay, topic, payload);
        } else if topic == self.feeds.system_mode {
            self.apply_mode(payload);
        } else {
            warn!(topic, payload, "unrecognized command topic; ignoring");
        }
    }

    fn apply_actuator(&self, id: ActuatorId, topic: &str, payload: &str) {
        let on = match parse_switch(payload) {
            Some(on) => on,
            None => {
                warn!(topic, payload, "invalid switch payload; ignoring");
                return;
            }
        };

        self.registry.set_state(id, on);
        info!(device = id.as_str(), on, "actuator command applied");
        self.recorder.record(
            JournalRecord::new("actuator_change")
                .field("device", id.as_str())
                .field("state", if on { "1" } else { "0" }),
        );
    }

    fn apply_mode(&self, payload: &str) {
        match self.mode.set_from_str(payload) {
            Ok(previous) => {
                let new_mode = self.mode.get();
                info!(%previous, %new_mode, "system mode changed");
                self.recorder
                    .record(JournalRecord::new("mode_change").field("new_mode", new_mode));
            }
            Err(e) => {
                warn!(payload, "rejected mode change: {e}");
                self.recorder
                    .record(JournalRecord::new("invalid_mode").field("value", payload));
            }
        }
    }
}

/// Parse an on/off command payload. Accepts the feed convention "1"/"0"
/// plus "on"/"off" in any case.
fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "1" | "on" => Some(true),
        "0" | "off" => Some(false),
        _ => None,
    }
}
