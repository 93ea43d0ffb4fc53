//! Structured commands arriving on the action and context topics.

use serde::Deserialize;

use noxy_core::actions::DEFAULT_LAYER;
use noxy_core::wire::from_json_ci;
use noxy_core::{
    ActionDefinition, ActionEffect, ArgumentDefinition, BridgeError, ContextDefinition, Timing,
};

/// A parsed action-topic payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionCommand {
    Add(ActionDefinition),
    Remove(String),
    /// A verb other than add/remove. Logged and dropped by the caller.
    Unknown(String),
}

// Field names are lower case because keys are folded before deserializing.
#[derive(Deserialize)]
struct RawActionCommand {
    action: Option<String>,
    name: Option<String>,
    description: Option<String>,
    timing: Option<String>,
    layer: Option<String>,
    setflags: Option<Vec<String>>,
    secret: Option<String>,
    note: Option<String>,
    #[serde(default)]
    cancelreply: bool,
    #[serde(default)]
    arguments: Vec<RawArgument>,
}

#[derive(Deserialize)]
struct RawArgument {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    required: bool,
    description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse `{"Action": "add"|"remove", "Name": ..., "Timing": ..., ...}`.
///
/// An add is all-or-nothing: a missing name, a missing or unknown timing, or
/// a bad argument type rejects the whole command.
pub fn parse_action_command(payload: &str) -> Result<ActionCommand, BridgeError> {
    let raw: RawActionCommand = from_json_ci(payload)?;
    let verb = non_empty(raw.action)
        .ok_or_else(|| BridgeError::invalid("action verb is required"))?;

    match verb.trim().to_ascii_lowercase().as_str() {
        "remove" => {
            let name = non_empty(raw.name)
                .ok_or_else(|| BridgeError::invalid("action name is required for remove"))?;
            Ok(ActionCommand::Remove(name))
        }
        "add" => {
            let name = non_empty(raw.name)
                .ok_or_else(|| BridgeError::invalid("action name is required for add"))?;
            let timing: Timing = non_empty(raw.timing)
                .ok_or_else(|| BridgeError::invalid(format!("missing timing for action {name}")))?
                .parse()?;
            let arguments = raw
                .arguments
                .into_iter()
                .map(|arg| -> Result<ArgumentDefinition, BridgeError> {
                    Ok(ArgumentDefinition {
                        name: arg.name,
                        kind: match arg.kind {
                            Some(kind) => kind.parse()?,
                            None => Default::default(),
                        },
                        required: arg.required,
                        description: arg.description,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ActionCommand::Add(ActionDefinition {
                name,
                description: raw.description,
                timing,
                layer: non_empty(raw.layer).unwrap_or_else(|| DEFAULT_LAYER.to_string()),
                effect: ActionEffect {
                    secret: raw.secret,
                    note: raw.note,
                    set_flags: raw.setflags,
                },
                arguments,
                cancel_reply: raw.cancelreply,
            }))
        }
        _ => Ok(ActionCommand::Unknown(verb)),
    }
}

/// A parsed context-topic payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextUpdate {
    pub context_key: String,
    pub contexts: Vec<ContextDefinition>,
}

#[derive(Deserialize)]
struct RawContextUpdate {
    contextkey: Option<String>,
    #[serde(default)]
    contexts: Vec<ContextDefinition>,
}

/// Parse `{"contextKey": ..., "contexts": [{"name", "text", "disabled"}, ...]}`.
pub fn parse_context_update(payload: &str) -> Result<ContextUpdate, BridgeError> {
    let raw: RawContextUpdate = from_json_ci(payload)?;
    let context_key = non_empty(raw.contextkey)
        .ok_or_else(|| BridgeError::invalid("contextKey is required"))?;
    Ok(ContextUpdate {
        context_key,
        contexts: raw.contexts,
    })
}
