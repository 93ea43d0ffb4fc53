use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use noxy_core::{BridgeError, BusEvent, BusTransport, ConnectOptions, QoS, TransportError};

use crate::retry::{retry_with_backoff, RetryPolicy};

/// One resilient bus endpoint, owned by a single bridge instance.
///
/// Reconnecting replaces the transport's socket state; the subscribed-topic
/// set and the inbound receiver survive, so the bridge keeps one identity.
pub struct Connection {
    transport: Arc<dyn BusTransport>,
    options: ConnectOptions,
    qos: QoS,
    retry: RetryPolicy,
    publish_timeout: Duration,
    topics: DashMap<String, QoS>,
    /// Held for the duration of a connect so attempts never overlap.
    connecting: Mutex<()>,
}

impl Connection {
    pub fn new(transport: Arc<dyn BusTransport>, options: ConnectOptions, qos: QoS) -> Self {
        Self {
            transport,
            options,
            qos,
            retry: RetryPolicy::default(),
            publish_timeout: Duration::from_secs(5),
            topics: DashMap::new(),
            connecting: Mutex::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn qos(&self) -> QoS {
        self.qos
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Hand the inbound event stream to its single owner.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<BusEvent>> {
        self.transport.take_inbound()
    }

    /// A single connect attempt. Previously subscribed topics are restored.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _guard = self.connecting.lock().await;
        if self.transport.is_connected() {
            return Ok(());
        }

        self.transport.connect(&self.options).await?;
        info!(
            client_id = %self.options.client_id,
            broker = %self.options.broker_address,
            port = self.options.port,
            "connected to bus"
        );

        let topics: Vec<(String, QoS)> = self
            .topics
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        for (topic, qos) in topics {
            if let Err(e) = self.transport.subscribe(&topic, qos).await {
                // The next attempt must start from a fresh link.
                warn!(topic = %topic, error = %e, "subscribe failed, dropping link");
                if let Err(de) = self.transport.disconnect().await {
                    warn!(error = %de, "disconnect after failed subscribe failed");
                }
                return Err(e);
            }
            debug!(topic = %topic, "re-subscribed");
        }
        Ok(())
    }

    /// Connect with exponential backoff. Exhaustion is fatal for the caller.
    pub async fn connect_with_retry(&self, cancel: &CancellationToken) -> Result<(), BridgeError> {
        retry_with_backoff(&self.retry, cancel, |_| self.connect())
            .await
            .map_err(BridgeError::from)
    }

    /// Remember `topic` without subscribing now. The next successful
    /// [`Connection::connect`] subscribes to it as part of the attempt.
    pub fn add_subscription(&self, topic: &str) {
        let _ = self.topics.insert(topic.to_string(), self.qos);
    }

    /// Register interest in `topic`. The topic is remembered for reconnects.
    pub async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        let _ = self.topics.insert(topic.to_string(), self.qos);
        self.transport.subscribe(topic, self.qos).await?;
        debug!(topic, "subscribed");
        Ok(())
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|e| e.key().clone()).collect();
        topics.sort();
        topics
    }

    /// Publish one message, returning control within the publish timeout.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<(), TransportError> {
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected);
        }
        tokio::time::timeout(
            self.publish_timeout,
            self.transport.publish(topic, payload.into(), self.qos),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.publish_timeout))?
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.transport.is_connected() {
            return Ok(());
        }
        self.transport.disconnect().await?;
        info!(client_id = %self.options.client_id, "disconnected from bus");
        Ok(())
    }
}
