use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;

/// Point in a conversational turn at which an action may fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timing {
    AfterUserMessage,
    BeforeAssistantMessage,
    AfterAssistantMessage,
    Manual,
    Button,
}

impl Timing {
    pub const ALL: [Timing; 5] = [
        Timing::AfterUserMessage,
        Timing::BeforeAssistantMessage,
        Timing::AfterAssistantMessage,
        Timing::Manual,
        Timing::Button,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AfterUserMessage => "AfterUserMessage",
            Self::BeforeAssistantMessage => "BeforeAssistantMessage",
            Self::AfterAssistantMessage => "AfterAssistantMessage",
            Self::Manual => "Manual",
            Self::Button => "Button",
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timing {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BridgeError::UnknownTiming(s.to_string()))
    }
}

/// Value type of an action argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
}

impl FromStr for ArgumentType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "number" | "float" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(BridgeError::invalid(format!("unknown argument type: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// What happens in the conversation when the action fires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEffect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_flags: Option<Vec<String>>,
}

/// A chat-invocable action, keyed by name in the action registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timing: Timing,
    pub layer: String,
    #[serde(default)]
    pub effect: ActionEffect,
    #[serde(default)]
    pub arguments: Vec<ArgumentDefinition>,
    #[serde(default)]
    pub cancel_reply: bool,
}

pub const DEFAULT_LAYER: &str = "default";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_parses_every_keyword() {
        for t in Timing::ALL {
            assert_eq!(t.as_str().parse::<Timing>().unwrap(), t);
        }
    }

    #[test]
    fn timing_is_case_insensitive() {
        assert_eq!("manual".parse::<Timing>().unwrap(), Timing::Manual);
        assert_eq!(" button ".parse::<Timing>().unwrap(), Timing::Button);
    }

    #[test]
    fn unknown_timing_is_rejected() {
        let err = "Whenever".parse::<Timing>().unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTiming(ref t) if t == "Whenever"));
    }

    #[test]
    fn argument_type_aliases() {
        assert_eq!("bool".parse::<ArgumentType>().unwrap(), ArgumentType::Boolean);
        assert_eq!("Number".parse::<ArgumentType>().unwrap(), ArgumentType::Number);
        assert!("tuple".parse::<ArgumentType>().is_err());
    }

    #[test]
    fn definition_serializes_camel_case() {
        let def = ActionDefinition {
            name: "wave".into(),
            description: None,
            timing: Timing::AfterAssistantMessage,
            layer: DEFAULT_LAYER.into(),
            effect: ActionEffect {
                set_flags: Some(vec!["waved".into()]),
                ..Default::default()
            },
            arguments: vec![],
            cancel_reply: false,
        };
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["timing"], "AfterAssistantMessage");
        assert_eq!(json["effect"]["setFlags"][0], "waved");
        assert_eq!(json["cancelReply"], false);
        assert!(json.get("description").is_none());
    }
}
