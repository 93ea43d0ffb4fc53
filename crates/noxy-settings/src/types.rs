//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may name only the fields it wants to change.

use std::time::Duration;

use noxy_core::QoS;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoxySettings {
    pub mqtt: MqttSettings,
    pub topics: TopicSettings,
    /// Which bridge instances to start.
    pub bridges: BridgeToggles,
    pub auto_reply: AutoReplySettings,
    pub interfaces: InterfaceSettings,
    pub audio: AudioSettings,
    pub reconnect: ReconnectSettings,
    pub dedup: DedupSettings,
    pub logging: LoggingSettings,
}

impl NoxySettings {
    /// Reject values the bridges cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.broker_address.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "mqtt.brokerAddress must not be empty".into(),
            ));
        }
        if self.mqtt.port == 0 {
            return Err(SettingsError::InvalidValue("mqtt.port must not be 0".into()));
        }
        if self.interfaces.button_count == 0 {
            return Err(SettingsError::InvalidValue(
                "interfaces.buttonCount must be at least 1".into(),
            ));
        }
        if self.reconnect.initial_delay_secs > self.reconnect.max_delay_secs {
            return Err(SettingsError::InvalidValue(
                "reconnect.initialDelaySecs must not exceed maxDelaySecs".into(),
            ));
        }
        for (name, topic) in self.topics.iter() {
            if topic.trim().is_empty() {
                return Err(SettingsError::InvalidValue(format!(
                    "topics.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MqttSettings {
    pub broker_address: String,
    pub port: u16,
    #[serde(rename = "qos")]
    pub qos: QoS,
    /// Each bridge connects as `<prefix>-<bridge name>`.
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    /// Bounded wait for a publish to be accepted.
    pub publish_timeout_ms: u64,
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_address: "127.0.0.1".into(),
            port: 1883,
            qos: QoS::AtLeastOnce,
            client_id_prefix: "noxy".into(),
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            publish_timeout_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopicSettings {
    /// Outgoing action and app triggers.
    pub trigger: String,
    /// Incoming action add/remove commands.
    pub action: String,
    pub context: String,
    /// Chat forwarding toggle and forwarded assistant messages.
    pub chat: String,
    /// Plain text injected into the conversation.
    pub message: String,
    pub keyboard: String,
    pub joystick: String,
    pub application: String,
    pub sound_effect: String,
    pub auto_reply: String,
}

impl TopicSettings {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("trigger", self.trigger.as_str()),
            ("action", self.action.as_str()),
            ("context", self.context.as_str()),
            ("chat", self.chat.as_str()),
            ("message", self.message.as_str()),
            ("keyboard", self.keyboard.as_str()),
            ("joystick", self.joystick.as_str()),
            ("application", self.application.as_str()),
            ("soundEffect", self.sound_effect.as_str()),
            ("autoReply", self.auto_reply.as_str()),
        ]
        .into_iter()
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            trigger: "/noxyred/trigger".into(),
            action: "/noxyred/action".into(),
            context: "/noxyred/context".into(),
            chat: "/noxyred/chat".into(),
            message: "/noxyred/message".into(),
            keyboard: "/noxyred/keyboard/".into(),
            joystick: "/noxyred/joystick".into(),
            application: "/noxyred/app".into(),
            sound_effect: "/sound/effects".into(),
            auto_reply: "/noxyred/autoreply".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeToggles {
    pub actions: bool,
    pub contexts: bool,
    pub chat: bool,
    pub auto_reply: bool,
    pub keyboard: bool,
    pub joystick: bool,
    pub audio: bool,
    pub application: bool,
}

impl Default for BridgeToggles {
    fn default() -> Self {
        Self {
            actions: true,
            contexts: true,
            chat: true,
            auto_reply: true,
            keyboard: true,
            joystick: true,
            audio: true,
            application: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoReplySettings {
    /// Idle delay before an automatic reply. `<= 0` starts disabled.
    pub delay_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterfaceSettings {
    pub button_count: u32,
    pub vjoy_device: u32,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            button_count: 32,
            vjoy_device: 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Directory holding `p_*.wav` presets. Relative paths resolve against
    /// the working directory.
    pub presets_dir: String,
    pub fade_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            presets_dir: "audio/presets".into(),
            fade_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_secs: 2,
            max_delay_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupSettings {
    pub window_ms: u64,
    /// Bridges whose inbound traffic goes through duplicate suppression.
    pub bridges: Vec<String>,
}

impl DedupSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn applies_to(&self, bridge: &str) -> bool {
        self.window_ms > 0 && self.bridges.iter().any(|b| b == bridge)
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            bridges: vec!["actions".into(), "contexts".into(), "chat".into()],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}
