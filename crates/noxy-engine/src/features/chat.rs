use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use noxy_core::{BridgeError, BusMessage, ChatRole, ClientMessage, SessionEvent};

use crate::dispatch::parse_chat_control;
use crate::feature::{Feature, FeatureContext};

/// Forwards assistant chat to the bus while enabled and injects bus text
/// into the conversation.
pub struct ChatFeature {
    chat_topic: String,
    message_topic: String,
    forwarding: AtomicBool,
}

impl ChatFeature {
    pub fn new(chat_topic: impl Into<String>, message_topic: impl Into<String>) -> Self {
        Self {
            chat_topic: chat_topic.into(),
            message_topic: message_topic.into(),
            forwarding: AtomicBool::new(false),
        }
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Feature for ChatFeature {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.chat_topic.clone(), self.message_topic.clone()]
    }

    fn clean_session(&self) -> bool {
        false
    }

    async fn on_bus_message(&self, ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        let text = message.text();
        if message.topic == self.chat_topic {
            // The chat topic also carries our own forwarded messages.
            match parse_chat_control(&text) {
                Some(enabled) => {
                    self.forwarding.store(enabled, Ordering::SeqCst);
                    info!(enabled, "chat forwarding switched");
                }
                None => debug!("non-control payload on chat topic, ignoring"),
            }
            Ok(())
        } else if message.topic == self.message_topic {
            info!(chars = text.len(), "injecting message into session");
            ctx.session().send_when_idle(ClientMessage::Send {
                session_id: ctx.session_id(),
                text,
            });
            Ok(())
        } else {
            warn!(topic = %message.topic, "unexpected topic");
            Ok(())
        }
    }

    async fn on_session_event(&self, ctx: &FeatureContext, event: &SessionEvent) -> Result<(), BridgeError> {
        if let SessionEvent::ChatMessage {
            role: ChatRole::Assistant,
            text,
        } = event
        {
            if self.is_forwarding() {
                debug!(topic = %self.chat_topic, "forwarding assistant message");
                ctx.publish(&self.chat_topic, text.clone()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::context;
    use noxy_core::testing::Delivery;

    fn feature() -> ChatFeature {
        ChatFeature::new("/noxyred/chat", "/noxyred/message")
    }

    fn said(text: &str) -> SessionEvent {
        SessionEvent::ChatMessage {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn forwarding_follows_the_switch() {
        let (mock, _, ctx) = context().await;
        let f = feature();

        f.on_session_event(&ctx, &said("before")).await.unwrap();
        f.on_bus_message(&ctx, &BusMessage::new("/noxyred/chat", "SwitchChatTopic=true"))
            .await
            .unwrap();
        f.on_session_event(&ctx, &said("during")).await.unwrap();
        f.on_session_event(
            &ctx,
            &SessionEvent::ChatMessage {
                role: ChatRole::User,
                text: "from user".into(),
            },
        )
        .await
        .unwrap();
        f.on_bus_message(&ctx, &BusMessage::new("/noxyred/chat", "SwitchChatTopic='false'"))
            .await
            .unwrap();
        f.on_session_event(&ctx, &said("after")).await.unwrap();

        assert_eq!(mock.published_on("/noxyred/chat"), vec!["during"]);
    }

    #[tokio::test]
    async fn messages_are_sent_when_idle_regardless_of_switch() {
        let (_, session, ctx) = context().await;
        let f = feature();
        f.on_bus_message(&ctx, &BusMessage::new("/noxyred/message", "The lights flicker."))
            .await
            .unwrap();

        let sent = session.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Delivery::WhenIdle);
        assert!(matches!(&sent[0].1, ClientMessage::Send { text, .. } if text == "The lights flicker."));
    }

    #[tokio::test]
    async fn blank_messages_are_forwarded_verbatim() {
        let (_, session, ctx) = context().await;
        let f = feature();
        f.on_bus_message(&ctx, &BusMessage::new("/noxyred/message", "  "))
            .await
            .unwrap();

        let sent = session.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0].1, ClientMessage::Send { text, .. } if text == "  "));
    }

    #[test]
    fn chat_keeps_a_persistent_session() {
        assert!(!feature().clean_session());
    }
}
