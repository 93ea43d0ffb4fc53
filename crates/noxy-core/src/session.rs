use serde::{Deserialize, Serialize};

use crate::actions::ActionDefinition;
use crate::contexts::ContextDefinition;
use crate::ids::SessionId;

/// Author of a chat message or action trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    Event,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerArgument {
    pub name: String,
    pub value: String,
}

impl TriggerArgument {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Events the session host delivers to bridge instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// The model invoked a registered action.
    #[serde(rename = "action_trigger")]
    ActionTrigger {
        name: String,
        role: ChatRole,
        #[serde(default)]
        layer: Option<String>,
        #[serde(default)]
        arguments: Vec<TriggerArgument>,
    },

    /// An app-level trigger emitted by the scenario.
    #[serde(rename = "app_trigger")]
    AppTrigger {
        name: String,
        #[serde(default)]
        arguments: Vec<String>,
    },

    /// A complete chat message was generated.
    #[serde(rename = "chat_message")]
    ChatMessage { role: ChatRole, text: String },

    #[serde(rename = "turn_started")]
    TurnStarted,

    #[serde(rename = "turn_completed")]
    TurnCompleted,
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ActionTrigger { .. } => "action_trigger",
            Self::AppTrigger { .. } => "app_trigger",
            Self::ChatMessage { .. } => "chat_message",
            Self::TurnStarted => "turn_started",
            Self::TurnCompleted => "turn_completed",
        }
    }
}

/// Messages a bridge sends into the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Full replacement of the session's action set.
    #[serde(rename = "update_actions")]
    UpdateActions {
        session_id: SessionId,
        context_key: String,
        actions: Vec<ActionDefinition>,
    },

    /// Full replacement of the session's context set.
    #[serde(rename = "update_contexts")]
    UpdateContexts {
        session_id: SessionId,
        context_key: String,
        contexts: Vec<ContextDefinition>,
    },

    /// Stop the reply currently being generated.
    #[serde(rename = "interrupt")]
    Interrupt { session_id: SessionId },

    #[serde(rename = "send")]
    Send { session_id: SessionId, text: String },
}

/// The conversation a bridge is attached to.
///
/// Both send methods are fire-and-forget. `send_when_idle` defers delivery
/// until the session is between turns; ordering among deferred messages is
/// preserved by the host.
pub trait SessionHost: Send + Sync {
    fn session_id(&self) -> &SessionId;
    fn send(&self, message: ClientMessage);
    fn send_when_idle(&self, message: ClientMessage);
}
