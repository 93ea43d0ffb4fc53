use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use noxy_core::{BridgeError, BusMessage, SessionHost};

use crate::commands::parse_context_update;
use crate::feature::{Feature, FeatureContext};
use crate::registry::ContextRegistry;

/// Mirrors named context entries from the bus into the session.
pub struct ContextFeature {
    topic: String,
    registry: ContextRegistry,
}

impl ContextFeature {
    pub fn new(topic: impl Into<String>, session: Arc<dyn SessionHost>) -> Self {
        Self {
            topic: topic.into(),
            registry: ContextRegistry::new(session),
        }
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }
}

#[async_trait]
impl Feature for ContextFeature {
    fn name(&self) -> &'static str {
        "contexts"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    /// Entries apply in order; a rejected entry does not stop the rest.
    async fn on_bus_message(&self, _ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        let update = parse_context_update(&message.text())?;
        info!(
            context_key = %update.context_key,
            entries = update.contexts.len(),
            "context update received"
        );

        for context in update.contexts {
            let name = context.name.clone();
            let result = if context.disabled {
                self.registry.remove(&name).map(|_| ())
            } else {
                self.registry.add(context)
            };
            if let Err(e) = result {
                warn!(name = %name, kind = e.error_kind(), error = %e, "context entry rejected");
            }
        }
        Ok(())
    }

    async fn on_shutdown(&self) {
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::context;
    use noxy_core::ClientMessage;

    #[tokio::test]
    async fn disabled_entries_remove() {
        let (_, session, ctx) = context().await;
        let f = ContextFeature::new("/noxyred/context", session.clone());

        let add = BusMessage::new(
            "/noxyred/context",
            r#"{"contextKey":"scene","contexts":[{"name":"room","text":"dark"},{"name":"door","text":"shut"}]}"#,
        );
        f.on_bus_message(&ctx, &add).await.unwrap();
        assert_eq!(f.registry().len(), 2);

        let disable = BusMessage::new(
            "/noxyred/context",
            r#"{"contextKey":"scene","contexts":[{"name":"door","disabled":true}]}"#,
        );
        f.on_bus_message(&ctx, &disable).await.unwrap();

        let names: Vec<String> = f.registry().snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["room"]);
        match session.messages().last().unwrap() {
            ClientMessage::UpdateContexts { context_key, contexts, .. } => {
                assert_eq!(context_key, "Contexts");
                assert_eq!(contexts.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_entry_does_not_block_the_rest() {
        let (_, session, ctx) = context().await;
        let f = ContextFeature::new("/noxyred/context", session.clone());
        f.registry()
            .add(noxy_core::ContextDefinition::new("room", "dark"))
            .unwrap();

        let msg = BusMessage::new(
            "/noxyred/context",
            r#"{"contextKey":"scene","contexts":[{"name":"room","text":"lit"},{"name":"ghost","disabled":true},{"name":"hall","text":"long"}]}"#,
        );
        f.on_bus_message(&ctx, &msg).await.unwrap();

        assert_eq!(f.registry().get("room").unwrap().text.as_deref(), Some("dark"));
        assert!(f.registry().contains("hall"));
        assert_eq!(session.count(), 2);
    }

    #[tokio::test]
    async fn missing_context_key_is_rejected() {
        let (_, session, ctx) = context().await;
        let f = ContextFeature::new("/noxyred/context", session);
        let msg = BusMessage::new("/noxyred/context", r#"{"contexts":[{"name":"room"}]}"#);
        assert!(matches!(
            f.on_bus_message(&ctx, &msg).await,
            Err(BridgeError::InvalidPayload(_))
        ));
    }
}
