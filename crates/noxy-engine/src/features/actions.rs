use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use noxy_core::{BridgeError, BusMessage, SessionEvent, SessionHost};

use crate::commands::{parse_action_command, ActionCommand};
use crate::dispatch::trigger_payload;
use crate::feature::{Feature, FeatureContext};
use crate::registry::ActionRegistry;

/// Registers actions from the bus and publishes triggers back to it.
pub struct ActionFeature {
    action_topic: String,
    trigger_topic: String,
    registry: ActionRegistry,
}

impl ActionFeature {
    pub fn new(
        action_topic: impl Into<String>,
        trigger_topic: impl Into<String>,
        session: Arc<dyn SessionHost>,
    ) -> Self {
        Self {
            action_topic: action_topic.into(),
            trigger_topic: trigger_topic.into(),
            registry: ActionRegistry::new(session),
        }
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }
}

#[async_trait]
impl Feature for ActionFeature {
    fn name(&self) -> &'static str {
        "actions"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.action_topic.clone()]
    }

    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        match parse_action_command(&message.text())? {
            ActionCommand::Add(definition) => self.registry.add(definition),
            ActionCommand::Remove(name) => self.registry.remove(&name).map(|_| ()),
            ActionCommand::Unknown(verb) => {
                warn!(verb = %verb, "unknown action verb, ignoring");
                Ok(())
            }
        }
    }

    async fn on_session_event(&self, ctx: &FeatureContext, event: &SessionEvent) -> Result<(), BridgeError> {
        match (event, trigger_payload(event)) {
            (_, Some(payload)) => {
                info!(topic = %self.trigger_topic, payload = %payload, "forwarding trigger");
                ctx.publish(&self.trigger_topic, payload).await
            }
            (SessionEvent::ActionTrigger { name, .. }, None) => {
                info!(name = %name, "event-role trigger kept in session");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn on_shutdown(&self) {
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::context;
    use noxy_core::{ChatRole, ClientMessage, TriggerArgument};

    fn feature(session: Arc<dyn SessionHost>) -> ActionFeature {
        ActionFeature::new("/noxyred/action", "/noxyred/trigger", session)
    }

    #[tokio::test]
    async fn add_then_remove_round_trip() {
        let (_, session, ctx) = context().await;
        let f = feature(session.clone());

        let add = BusMessage::new(
            "/noxyred/action",
            r#"{"Action":"add","Name":"wave","Timing":"Button","Description":"Wave"}"#,
        );
        f.on_bus_message(&ctx, &add).await.unwrap();
        assert_eq!(f.registry().snapshot()[0].description.as_deref(), Some("Wave"));

        let remove = BusMessage::new("/noxyred/action", r#"{"Action":"remove","Name":"wave"}"#);
        f.on_bus_message(&ctx, &remove).await.unwrap();
        assert!(f.registry().is_empty());

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[1], ClientMessage::UpdateActions { actions, .. } if actions.is_empty()));
    }

    #[tokio::test]
    async fn unknown_timing_leaves_registry_untouched() {
        let (_, session, ctx) = context().await;
        let f = feature(session.clone());
        let msg = BusMessage::new(
            "/noxyred/action",
            r#"{"Action":"add","Name":"wave","Timing":"Eventually"}"#,
        );
        let err = f.on_bus_message(&ctx, &msg).await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownTiming(_)));
        assert!(f.registry().is_empty());
        assert_eq!(session.count(), 0);
    }

    #[tokio::test]
    async fn triggers_are_published() {
        let (mock, session, ctx) = context().await;
        let f = feature(session);

        let trigger = SessionEvent::ActionTrigger {
            name: "wave".into(),
            role: ChatRole::Assistant,
            layer: None,
            arguments: vec![TriggerArgument::new("hand", "left")],
        };
        f.on_session_event(&ctx, &trigger).await.unwrap();

        let event = SessionEvent::ActionTrigger {
            name: "scene".into(),
            role: ChatRole::Event,
            layer: None,
            arguments: vec![],
        };
        f.on_session_event(&ctx, &event).await.unwrap();

        let app = SessionEvent::AppTrigger {
            name: "lights".into(),
            arguments: vec!["on".into()],
        };
        f.on_session_event(&ctx, &app).await.unwrap();

        assert_eq!(
            mock.published_on("/noxyred/trigger"),
            vec!["wave:hand:left", "lights:0:on"]
        );
    }
}
