use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use noxy_bus::Connection;
use noxy_core::{BridgeError, BusEvent, BusMessage, SessionEvent, SessionHost, TransportError};

use crate::dedup::DuplicateCache;
use crate::feature::{Feature, FeatureContext};

struct Inner {
    feature: Arc<dyn Feature>,
    ctx: FeatureContext,
    connection: Arc<Connection>,
    dedup: Option<DuplicateCache>,
    cancel: CancellationToken,
    shut_down: AtomicBool,
}

/// One bridge instance: a feature strategy bound to its own bus connection
/// and the shared session.
///
/// Instances share nothing with each other, so one instance exhausting its
/// retries never affects its siblings.
pub struct BridgeEngine {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeEngine {
    pub fn new(
        feature: Arc<dyn Feature>,
        connection: Arc<Connection>,
        session: Arc<dyn SessionHost>,
        dedup: Option<DuplicateCache>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: FeatureContext::new(Arc::clone(&connection), session),
                feature,
                connection,
                dedup,
                cancel: CancellationToken::new(),
                shut_down: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.feature.name()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// True until the instance shuts down, whether asked to or on its own.
    pub fn is_running(&self) -> bool {
        !self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Resolves once the instance has stopped.
    pub async fn stopped(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Connect (with retry), subscribe, and start the event loop.
    ///
    /// Retry exhaustion shuts this instance down and is returned to the caller.
    pub async fn start(&self, events: broadcast::Receiver<SessionEvent>) -> Result<(), BridgeError> {
        if self.task.lock().is_some() {
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let span = info_span!("bridge", bridge = inner.feature.name());

        let inbound = async {
            for topic in inner.feature.subscriptions() {
                inner.connection.add_subscription(&topic);
            }
            inner.connection.connect_with_retry(&inner.cancel).await?;
            info!(topics = ?inner.connection.subscribed_topics(), "bridge connected");

            let inbound = inner.connection.take_inbound().ok_or_else(|| {
                TransportError::ConnectFailed("inbound stream already claimed".into())
            })?;
            if let Err(e) = inner.feature.on_start(&inner.ctx).await {
                warn!(kind = e.error_kind(), error = %e, "feature start hook failed");
            }
            Ok::<_, BridgeError>(inbound)
        }
        .instrument(span.clone())
        .await;

        let inbound = match inbound {
            Ok(inbound) => inbound,
            Err(BridgeError::Cancelled) => {
                info!(bridge = inner.feature.name(), "bridge start cancelled");
                inner.shutdown().await;
                return Err(BridgeError::Cancelled);
            }
            Err(e) => {
                error!(bridge = inner.feature.name(), kind = e.error_kind(), error = %e, "bridge failed to start");
                inner.shutdown().await;
                return Err(e);
            }
        };
        if inner.cancel.is_cancelled() {
            // Shut down while the connect was completing.
            if let Err(e) = inner.connection.disconnect().await {
                warn!(bridge = inner.feature.name(), error = %e, "disconnect failed");
            }
            return Err(BridgeError::Cancelled);
        }

        let task = tokio::spawn(Arc::clone(&inner).run(inbound, events).instrument(span));
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Stop the instance. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(bridge = self.name(), error = %e, "bridge task ended abnormally");
                }
            }
        }
    }

    /// Process one bus message as if it had arrived on the inbound stream.
    pub async fn handle_bus_message(&self, message: &BusMessage) {
        self.inner.handle_bus_message(message).await;
    }

    pub async fn handle_session_event(&self, event: &SessionEvent) {
        self.inner.handle_session_event(event).await;
    }
}

impl Inner {
    async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<BusEvent>,
        events: broadcast::Receiver<SessionEvent>,
    ) {
        let mut events = Some(events);
        loop {
            let next_event = async {
                match events.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                bus = inbound.recv() => match bus {
                    Some(BusEvent::Message(message)) => self.handle_bus_message(&message).await,
                    Some(BusEvent::Disconnected(reason)) => {
                        warn!(reason = %reason, "bus link lost, reconnecting");
                        if let Err(e) = self.connection.connect_with_retry(&self.cancel).await {
                            if e.is_fatal() {
                                error!(kind = e.error_kind(), error = %e, "reconnect failed, stopping bridge");
                                self.shutdown().await;
                            }
                            break;
                        }
                        info!("bus link restored");
                    }
                    None => {
                        info!("inbound stream closed");
                        break;
                    }
                },
                event = next_event => match event {
                    Ok(event) => self.handle_session_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "session events lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("session event channel closed");
                        events = None;
                    }
                },
            }
        }
        debug!("bridge loop exited");
    }

    async fn handle_bus_message(&self, message: &BusMessage) {
        if let Some(dedup) = &self.dedup {
            if !dedup.accept(&message.payload) {
                warn!(topic = %message.topic, "duplicate message inside window, skipping");
                return;
            }
        }
        debug!(topic = %message.topic, payload = %message.text(), "bus message");

        if let Err(e) = self.feature.on_bus_message(&self.ctx, message).await {
            report(&e, "bus message dropped", &message.topic);
        }
    }

    async fn handle_session_event(&self, event: &SessionEvent) {
        if let Err(e) = self.feature.on_session_event(&self.ctx, event).await {
            report(&e, "session event not forwarded", event.event_type());
        }
    }

    /// Cancel, disconnect, release. Every step runs even if one fails.
    async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(bridge = self.feature.name(), "shutting down bridge");
        self.cancel.cancel();

        if self.connection.is_connected() {
            if let Err(e) = self.connection.disconnect().await {
                warn!(bridge = self.feature.name(), error = %e, "disconnect failed");
            }
        }
        self.feature.on_shutdown().await;
    }
}

fn report(e: &BridgeError, what: &str, source: &str) {
    if matches!(e, BridgeError::Transport(_)) {
        error!(kind = e.error_kind(), error = %e, source, "{what}");
    } else {
        warn!(kind = e.error_kind(), error = %e, source, "{what}");
    }
}
