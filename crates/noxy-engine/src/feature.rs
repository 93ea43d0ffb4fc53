use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use noxy_bus::Connection;
use noxy_core::{BridgeError, BusMessage, SessionEvent, SessionHost, SessionId};

/// What a feature can reach while handling a message.
#[derive(Clone)]
pub struct FeatureContext {
    connection: Arc<Connection>,
    session: Arc<dyn SessionHost>,
}

impl FeatureContext {
    pub fn new(connection: Arc<Connection>, session: Arc<dyn SessionHost>) -> Self {
        Self {
            connection,
            session,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn session(&self) -> &dyn SessionHost {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> SessionId {
        self.session.session_id().clone()
    }

    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<(), BridgeError> {
        self.connection.publish(topic, payload).await?;
        Ok(())
    }
}

/// The per-feature strategy a [`crate::BridgeEngine`] runs.
///
/// The engine owns connection, retry, dedup and lifecycle; a feature only
/// says which topics it listens on and how to translate what arrives.
/// Returned errors are logged and the offending message is dropped.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Bridge name, used for the client id and in logs.
    fn name(&self) -> &'static str;

    fn subscriptions(&self) -> Vec<String>;

    /// Whether the broker should forget this bridge between connections.
    fn clean_session(&self) -> bool {
        true
    }

    async fn on_start(&self, _ctx: &FeatureContext) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn on_bus_message(&self, ctx: &FeatureContext, message: &BusMessage) -> Result<(), BridgeError>;

    async fn on_session_event(&self, _ctx: &FeatureContext, _event: &SessionEvent) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Release registries, timers and device handles. Must not fail.
    async fn on_shutdown(&self) {}
}
