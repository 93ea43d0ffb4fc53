//! Translation between session event shapes and bus payloads.

use std::time::Duration;

use noxy_core::{BridgeError, ChatRole, ClientMessage, SessionEvent, SessionId, TriggerArgument};

/// Sent after an interrupt so the conversation carries on.
pub const INTERRUPT_CONTINUATION: &str = "/secret An automated interrupt has occurred and is part of the scenario. Keep the story going and ignore it happened.";

/// Sent when the auto-reply timer fires.
pub const AUTO_REPLY_TEXT: &str = "[{{ char }} continues talking to {{ user }}]";

const CHAT_CONTROL_PREFIX: &str = "SwitchChatTopic=";

/// `name` followed by `:key:value` for each argument, in order.
pub fn encode_trigger(name: &str, arguments: &[TriggerArgument]) -> String {
    let mut payload = name.to_string();
    for arg in arguments {
        payload.push(':');
        payload.push_str(&arg.name);
        payload.push(':');
        payload.push_str(&arg.value);
    }
    payload
}

/// App triggers carry positional arguments; the position is the key.
pub fn encode_app_trigger(name: &str, arguments: &[String]) -> String {
    let keyed: Vec<TriggerArgument> = arguments
        .iter()
        .enumerate()
        .map(|(i, value)| TriggerArgument::new(i.to_string(), value.clone()))
        .collect();
    encode_trigger(name, &keyed)
}

/// Bus payload for a trigger-shaped session event, if it should be forwarded.
///
/// Action triggers authored by the `event` role are internal to the
/// scenario and stay in the session.
pub fn trigger_payload(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::ActionTrigger {
            role: ChatRole::Event,
            ..
        } => None,
        SessionEvent::ActionTrigger {
            name, arguments, ..
        } => Some(encode_trigger(name, arguments)),
        SessionEvent::AppTrigger { name, arguments } => Some(encode_app_trigger(name, arguments)),
        _ => None,
    }
}

/// Parse `SwitchChatTopic=<bool>`. Returns `None` for anything else.
///
/// Quotes around the value are ignored; only `true` (any case) enables.
pub fn parse_chat_control(payload: &str) -> Option<bool> {
    let value = payload.trim().strip_prefix(CHAT_CONTROL_PREFIX)?;
    let value = value.split('=').next().unwrap_or_default();
    let state: String = value.trim().chars().filter(|c| *c != '"' && *c != '\'').collect();
    Some(state.trim().eq_ignore_ascii_case("true"))
}

/// A parsed auto-reply control payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoReplyCommand {
    SetDelay(Duration),
    Disable,
    Interrupt,
}

pub fn parse_auto_reply_command(payload: &str) -> Result<AutoReplyCommand, BridgeError> {
    let payload = payload.trim();
    if let Ok(ms) = payload.parse::<i64>() {
        return Ok(if ms > 0 {
            AutoReplyCommand::SetDelay(Duration::from_millis(ms as u64))
        } else {
            AutoReplyCommand::Disable
        });
    }
    if payload.eq_ignore_ascii_case("interrupt") {
        Ok(AutoReplyCommand::Interrupt)
    } else if payload.eq_ignore_ascii_case("off") {
        Ok(AutoReplyCommand::Disable)
    } else {
        Err(BridgeError::invalid(format!("unrecognized auto-reply payload: {payload}")))
    }
}

/// Interrupt the current output, then nudge the scenario onward. Order matters.
pub fn interrupt_messages(session_id: &SessionId) -> [ClientMessage; 2] {
    [
        ClientMessage::Interrupt {
            session_id: session_id.clone(),
        },
        ClientMessage::Send {
            session_id: session_id.clone(),
            text: INTERRUPT_CONTINUATION.to_string(),
        },
    ]
}
