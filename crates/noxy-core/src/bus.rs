use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::TransportError;

/// Delivery guarantee requested from the broker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(format!("QoS must be 0, 1 or 2 (got {other})")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// A message received from the bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text. Invalid UTF-8 sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// What the transport reports to its single inbound owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Message(BusMessage),
    /// The link dropped. The owner decides whether and how to reconnect.
    Disconnected(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectOptions {
    pub broker_address: String,
    pub port: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: Duration,
    /// Upper bound on waiting for the broker to accept the connection.
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            broker_address: "127.0.0.1".into(),
            port: 1883,
            client_id: "noxy".into(),
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A publish/subscribe connection to the automation bus.
///
/// Inbound traffic is delivered through a single channel. `take_inbound`
/// hands the receiver to its one owner and returns `None` afterwards; the
/// same receiver keeps working across reconnects.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError>;
    fn is_connected(&self) -> bool;
    fn take_inbound(&self) -> Option<mpsc::Receiver<BusEvent>>;
}
