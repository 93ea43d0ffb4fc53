use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use noxy_core::{BusEvent, BusMessage, BusTransport, ConnectOptions, QoS, TransportError};

const REQUEST_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 1024;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Live broker session: the request handle plus the task driving the event loop.
struct Link {
    client: AsyncClient,
    poller: JoinHandle<()>,
    closing: Arc<AtomicBool>,
    acks: Arc<AckTracker>,
}

#[derive(Default)]
struct AckState {
    /// Publishes handed to the event loop that it has not sent yet, in order.
    queued: VecDeque<(QoS, oneshot::Sender<()>)>,
    /// Sent QoS 1/2 publishes by packet id, waiting for PUBACK or PUBCOMP.
    in_flight: HashMap<u16, oneshot::Sender<()>>,
}

/// Matches outgoing publishes to their broker acknowledgements.
///
/// The event loop sends requests in the order they were queued, so the
/// n-th `Outgoing::Publish` belongs to the n-th queued waiter. QoS 0
/// resolves once the packet is written.
#[derive(Default)]
struct AckTracker {
    state: Mutex<AckState>,
}

impl AckTracker {
    /// Queue a waiter and hand the request over while holding the lock, so
    /// waiter order always matches request order.
    fn submit<E, F>(&self, qos: QoS, send: F) -> Result<oneshot::Receiver<()>, E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock();
        send()?;
        state.queued.push_back((qos, tx));
        Ok(rx)
    }

    fn on_outgoing(&self, pkid: u16) {
        let mut state = self.state.lock();
        match state.queued.pop_front() {
            Some((QoS::AtMostOnce, tx)) => {
                let _ = tx.send(());
            }
            Some((_, tx)) => {
                let _ = state.in_flight.insert(pkid, tx);
            }
            None => debug!(pkid, "publish sent without a waiter"),
        }
    }

    fn on_ack(&self, pkid: u16) {
        if let Some(tx) = self.state.lock().in_flight.remove(&pkid) {
            let _ = tx.send(());
        }
    }

    /// Drop every waiter; their publishes fail as unacknowledged.
    fn fail_all(&self) {
        let mut state = self.state.lock();
        state.queued.clear();
        state.in_flight.clear();
    }
}

/// [`BusTransport`] over MQTT 3.1.1 via `rumqttc`.
///
/// The event loop runs in its own task until the link drops, at which point
/// it reports [`BusEvent::Disconnected`] and stops. Reconnecting is left to
/// the owner of the connection.
pub struct MqttTransport {
    link: Mutex<Option<Link>>,
    connected: Arc<AtomicBool>,
    inbound_tx: mpsc::Sender<BusEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<BusEvent>>>,
}

impl MqttTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        Self {
            link: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            inbound_tx: tx,
            inbound_rx: Mutex::new(Some(rx)),
        }
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.client.clone())
            .ok_or(TransportError::NotConnected)
    }

    fn acks(&self) -> Result<Arc<AckTracker>, TransportError> {
        self.link
            .lock()
            .as_ref()
            .map(|link| Arc::clone(&link.acks))
            .ok_or(TransportError::NotConnected)
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn mqtt_options(options: &ConnectOptions) -> MqttOptions {
    let mut mqtt = MqttOptions::new(
        options.client_id.clone(),
        options.broker_address.clone(),
        options.port,
    );
    mqtt.set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE));
    mqtt.set_clean_session(options.clean_session);
    mqtt
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

/// Poll until the broker answers the CONNECT.
async fn await_connack(event_loop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::ConnectFailed(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(TransportError::ConnectFailed(e.to_string())),
        }
    }
}

async fn drive(
    mut event_loop: EventLoop,
    tx: mpsc::Sender<BusEvent>,
    connected: Arc<AtomicBool>,
    closing: Arc<AtomicBool>,
    acks: Arc<AckTracker>,
) {
    drive_events(&mut event_loop, &tx, &connected, &closing, &acks).await;
    acks.fail_all();
}

async fn drive_events(
    event_loop: &mut EventLoop,
    tx: &mpsc::Sender<BusEvent>,
    connected: &AtomicBool,
    closing: &AtomicBool,
    acks: &AckTracker,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "bus message received");
                let message = BusMessage::new(publish.topic, publish.payload);
                if tx.send(BusEvent::Message(message)).await.is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => acks.on_outgoing(pkid),
            Ok(Event::Incoming(Packet::PubAck(ack))) => acks.on_ack(ack.pkid),
            Ok(Event::Incoming(Packet::PubComp(comp))) => acks.on_ack(comp.pkid),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                if !closing.load(Ordering::SeqCst) {
                    error!(error = %e, "bus link dropped");
                    let _ = tx.send(BusEvent::Disconnected(e.to_string())).await;
                }
                return;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl BusTransport for MqttTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        if let Some(stale) = self.link.lock().take() {
            stale.closing.store(true, Ordering::SeqCst);
            stale.poller.abort();
        }

        let (client, mut event_loop) = AsyncClient::new(mqtt_options(options), REQUEST_CAPACITY);
        tokio::time::timeout(options.connect_timeout, await_connack(&mut event_loop))
            .await
            .map_err(|_| TransportError::Timeout(options.connect_timeout))??;

        self.connected.store(true, Ordering::SeqCst);
        let closing = Arc::new(AtomicBool::new(false));
        let acks = Arc::new(AckTracker::default());
        let poller = tokio::spawn(drive(
            event_loop,
            self.inbound_tx.clone(),
            self.connected.clone(),
            closing.clone(),
            acks.clone(),
        ));
        *self.link.lock() = Some(Link {
            client,
            poller,
            closing,
            acks,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(link) = self.link.lock().take() else {
            return Ok(());
        };
        link.closing.store(true, Ordering::SeqCst);
        if let Err(e) = link.client.disconnect().await {
            warn!(error = %e, "disconnect request failed");
        }

        let mut poller = link.poller;
        if tokio::time::timeout(DISCONNECT_GRACE, &mut poller).await.is_err() {
            poller.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic, to_mqtt_qos(qos))
            .await
            .map_err(|e| TransportError::SubscribeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    /// Resolves once the broker acknowledges (QoS 1/2) or the packet is
    /// written (QoS 0). The caller bounds the wait.
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), TransportError> {
        let client = self.client()?;
        let acks = self.acks()?;
        let failed = |reason: String| TransportError::PublishFailed {
            topic: topic.to_string(),
            reason,
        };

        let acked = acks
            .submit(qos, || {
                client.try_publish(topic, to_mqtt_qos(qos), false, payload.to_vec())
            })
            .map_err(|e| failed(e.to_string()))?;
        acked
            .await
            .map_err(|_| failed("link closed before acknowledgement".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<BusEvent>> {
        self.inbound_rx.lock().take()
    }
}
