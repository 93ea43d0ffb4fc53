use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use noxy_core::{BusEvent, BusMessage, BusTransport, ConnectOptions, QoS, TransportError};

/// In-memory transport with scripted connect outcomes, for deterministic tests.
///
/// Connect attempts consume the script front to back; once it is empty every
/// attempt succeeds. Publishes and subscriptions are recorded, and inbound
/// traffic is injected with [`MockTransport::inject`].
pub struct MockTransport {
    connect_script: Mutex<VecDeque<TransportError>>,
    subscribe_failures: AtomicUsize,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fail_publish: AtomicBool,
    last_options: Mutex<Option<ConnectOptions>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    published: Mutex<Vec<(String, Bytes, QoS)>>,
    inbound_tx: mpsc::Sender<BusEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<BusEvent>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1024);
        Self {
            connect_script: Mutex::new(VecDeque::new()),
            subscribe_failures: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            fail_publish: AtomicBool::new(false),
            last_options: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            inbound_tx: tx,
            inbound_rx: Mutex::new(Some(rx)),
        }
    }

    /// The next `n` connect attempts fail with `ConnectFailed`.
    pub fn fail_next_connects(&self, n: usize) {
        let mut script = self.connect_script.lock();
        for _ in 0..n {
            script.push_back(TransportError::ConnectFailed("connection refused".into()));
        }
    }

    /// The next `n` subscribe calls fail with `SubscribeFailed`.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.subscribe_failures.fetch_add(n, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.last_options.lock().clone()
    }

    /// Every successful subscribe call in order, including re-subscriptions.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, Bytes, QoS)> {
        self.published.lock().clone()
    }

    /// Payloads published on `topic`, as text.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    /// Deliver a message as if the broker had pushed it.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        let event = BusEvent::Message(BusMessage::new(topic, payload));
        if self.inbound_tx.try_send(event).is_err() {
            tracing::warn!(topic, "mock inbound channel full or closed");
        }
    }

    /// Simulate the broker dropping the link.
    pub fn drop_link(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self
            .inbound_tx
            .try_send(BusEvent::Disconnected(reason.to_string()));
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusTransport for MockTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());
        let scripted = self.connect_script.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let failing = self
            .subscribe_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::SubscribeFailed {
                topic: topic.to_string(),
                reason: "scripted failure".into(),
            });
        }
        self.subscriptions.lock().push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: "scripted failure".into(),
            });
        }
        self.published.lock().push((topic.to_string(), payload, qos));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<BusEvent>> {
        self.inbound_rx.lock().take()
    }
}
