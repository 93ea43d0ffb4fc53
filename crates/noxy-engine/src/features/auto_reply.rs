use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use noxy_core::{BridgeError, BusMessage, SessionEvent, SessionHost};

use crate::autoreply::AutoReplyTimer;
use crate::dispatch::{interrupt_messages, parse_auto_reply_command, AutoReplyCommand};
use crate::feature::{Feature, FeatureContext};

/// Idle auto-reply timer and interrupt control.
pub struct AutoReplyFeature {
    topic: String,
    initial_delay_ms: i64,
    timer: AutoReplyTimer,
}

impl AutoReplyFeature {
    /// `initial_delay_ms <= 0` starts disabled.
    pub fn new(topic: impl Into<String>, initial_delay_ms: i64, session: Arc<dyn SessionHost>) -> Self {
        Self {
            topic: topic.into(),
            initial_delay_ms,
            timer: AutoReplyTimer::new(session),
        }
    }

    pub fn timer(&self) -> &AutoReplyTimer {
        &self.timer
    }
}

#[async_trait]
impl Feature for AutoReplyFeature {
    fn name(&self) -> &'static str {
        "auto_reply"
    }

    fn subscriptions(&self) -> Vec<String> {
        vec![self.topic.clone()]
    }

    async fn on_start(&self, _ctx: &FeatureContext) -> Result<(), BridgeError> {
        if self.initial_delay_ms > 0 {
            self.timer
                .configure(Duration::from_millis(self.initial_delay_ms as u64));
        }
        Ok(())
    }

    async fn on_bus_message(&self, ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError> {
        match parse_auto_reply_command(&message.text())? {
            AutoReplyCommand::SetDelay(delay) => self.timer.configure(delay),
            AutoReplyCommand::Disable => self.timer.disable(),
            AutoReplyCommand::Interrupt => {
                for msg in interrupt_messages(&ctx.session_id()) {
                    ctx.session().send(msg);
                }
                info!("interrupt sent with continuation");
            }
        }
        Ok(())
    }

    async fn on_session_event(&self, _ctx: &FeatureContext, event: &SessionEvent) -> Result<(), BridgeError> {
        match event {
            SessionEvent::TurnStarted => self.timer.pause(),
            SessionEvent::TurnCompleted | SessionEvent::ChatMessage { .. } => self.timer.restart(),
            _ => {}
        }
        Ok(())
    }

    async fn on_shutdown(&self) {
        self.timer.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AUTO_REPLY_TEXT, INTERRUPT_CONTINUATION};
    use crate::features::test_support::context;
    use noxy_core::ClientMessage;

    fn msg(payload: &str) -> BusMessage {
        BusMessage::new("/noxyred/autoreply", payload.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn numeric_payload_enables_timer() {
        let (_, session, ctx) = context().await;
        let f = AutoReplyFeature::new("/noxyred/autoreply", 0, session.clone());
        f.on_start(&ctx).await.unwrap();
        assert!(!f.timer().is_enabled());

        f.on_bus_message(&ctx, &msg("500")).await.unwrap();
        assert!(f.timer().is_enabled());
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert!(matches!(&session.messages()[0], ClientMessage::Send { text, .. } if text == AUTO_REPLY_TEXT));

        f.on_bus_message(&ctx, &msg("off")).await.unwrap();
        assert!(!f.timer().is_enabled());
        f.on_bus_message(&ctx, &msg("250")).await.unwrap();
        f.on_bus_message(&ctx, &msg("0")).await.unwrap();
        assert!(!f.timer().is_enabled());
    }

    #[tokio::test]
    async fn interrupt_sends_two_messages_in_order() {
        let (_, session, ctx) = context().await;
        let f = AutoReplyFeature::new("/noxyred/autoreply", 0, session.clone());
        f.on_bus_message(&ctx, &msg("INTERRUPT")).await.unwrap();

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ClientMessage::Interrupt { .. }));
        assert!(matches!(&messages[1], ClientMessage::Send { text, .. } if text == INTERRUPT_CONTINUATION));
        assert!(!f.timer().is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn configured_delay_starts_enabled() {
        let (_, session, ctx) = context().await;
        let f = AutoReplyFeature::new("/noxyred/autoreply", 1_000, session.clone());
        f.on_start(&ctx).await.unwrap();
        assert!(f.timer().is_enabled());

        f.on_session_event(&ctx, &SessionEvent::TurnStarted).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.count(), 0);

        f.on_session_event(&ctx, &SessionEvent::TurnCompleted).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        assert_eq!(session.count(), 1);
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let (_, session, ctx) = context().await;
        let f = AutoReplyFeature::new("/noxyred/autoreply", 0, session);
        assert!(matches!(
            f.on_bus_message(&ctx, &msg("later")).await,
            Err(BridgeError::InvalidPayload(_))
        ));
    }
}
