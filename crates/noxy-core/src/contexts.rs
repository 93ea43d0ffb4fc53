use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named piece of background state pushed into the conversation.
///
/// Only `name` and `disabled` carry meaning for the bridge; every other
/// field travels through to the session untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextDefinition {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            disabled: false,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_are_preserved() {
        let ctx: ContextDefinition =
            serde_json::from_str(r#"{"name":"room","text":"dark","mood":"tense"}"#).unwrap();
        assert!(!ctx.disabled);
        assert_eq!(ctx.extra["mood"], "tense");

        let back = serde_json::to_value(&ctx).unwrap();
        assert_eq!(back["mood"], "tense");
        assert_eq!(back["text"], "dark");
    }
}
