//! Starts one bridge instance per enabled feature and stops them together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use noxy_bus::{Connection, MqttTransport, RetryPolicy};
use noxy_core::{BridgeError, BusTransport, ConnectOptions, SessionEvent, SessionHost};
use noxy_engine::features::{
    ActionFeature, ApplicationFeature, AudioFeature, AutoReplyFeature, ChatFeature, ContextFeature,
    JoystickFeature, KeyboardFeature,
};
use noxy_engine::{AudioDeck, BridgeEngine, DuplicateCache, Feature};
use noxy_settings::NoxySettings;

use crate::drivers::Drivers;

/// Upper bound on waiting for every instance to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// The configured bridge instances.
///
/// Built before anything connects, so [`HostHandle::shutdown`] can cancel
/// instances that are still retrying their first connect.
pub struct HostHandle {
    engines: Vec<Arc<BridgeEngine>>,
    shut_down: AtomicBool,
}

impl HostHandle {
    /// Names of every configured instance.
    pub fn bridges(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn engine(&self, name: &str) -> Option<&Arc<BridgeEngine>> {
        self.engines.iter().find(|e| e.name() == name)
    }

    /// Instances still running. Drops when one exhausts its retries.
    pub fn running(&self) -> usize {
        self.engines.iter().filter(|e| e.is_running()).count()
    }

    /// Connect every instance concurrently and return the names of those
    /// that started. One that fails to connect is logged and stopped; the
    /// others keep running.
    pub async fn start(&self, events: &broadcast::Sender<SessionEvent>) -> Vec<&'static str> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let results = join_all(self.engines.iter().map(|e| e.start(events.subscribe()))).await;

        let mut started = Vec::with_capacity(self.engines.len());
        for (engine, result) in self.engines.iter().zip(results) {
            match result {
                Ok(()) => started.push(engine.name()),
                Err(BridgeError::Cancelled) => info!(bridge = engine.name(), "bridge start cancelled"),
                Err(e) => error!(
                    bridge = engine.name(),
                    kind = e.error_kind(),
                    error = %e,
                    "bridge not started"
                ),
            }
        }
        info!(bridges = ?started, "bridges running");
        started
    }

    /// Stop every instance, including ones still connecting. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(count = self.engines.len(), "stopping bridges");
        let stops = join_all(self.engines.iter().map(|e| e.shutdown()));
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, stops).await.is_err() {
            warn!("bridge shutdown timed out after {SHUTDOWN_TIMEOUT:?}");
        }
    }
}

/// One instance per enabled bridge, each with its own MQTT connection.
pub fn build(settings: &NoxySettings, session: Arc<dyn SessionHost>, drivers: Drivers) -> HostHandle {
    build_with(settings, session, drivers, |_| {
        Arc::new(MqttTransport::new()) as Arc<dyn BusTransport>
    })
}

/// Like [`build`], with each instance's transport built by `transport`
/// (called with the bridge name).
pub fn build_with(
    settings: &NoxySettings,
    session: Arc<dyn SessionHost>,
    drivers: Drivers,
    transport: impl Fn(&str) -> Arc<dyn BusTransport>,
) -> HostHandle {
    let engines = enabled_features(settings, &session, &drivers)
        .into_iter()
        .map(|feature| {
            let name = feature.name();
            let connection = Connection::new(
                transport(name),
                connect_options(settings, name, feature.clean_session()),
                settings.mqtt.qos,
            )
            .with_retry(retry_policy(settings))
            .with_publish_timeout(settings.mqtt.publish_timeout());
            let dedup = settings
                .dedup
                .applies_to(name)
                .then(|| DuplicateCache::new(settings.dedup.window()));
            Arc::new(BridgeEngine::new(
                feature,
                Arc::new(connection),
                Arc::clone(&session),
                dedup,
            ))
        })
        .collect();

    HostHandle {
        engines,
        shut_down: AtomicBool::new(false),
    }
}

fn enabled_features(
    settings: &NoxySettings,
    session: &Arc<dyn SessionHost>,
    drivers: &Drivers,
) -> Vec<Arc<dyn Feature>> {
    let topics = &settings.topics;
    let on = &settings.bridges;
    let mut features: Vec<Arc<dyn Feature>> = Vec::new();

    if on.actions {
        features.push(Arc::new(ActionFeature::new(
            &topics.action,
            &topics.trigger,
            Arc::clone(session),
        )));
    }
    if on.contexts {
        features.push(Arc::new(ContextFeature::new(&topics.context, Arc::clone(session))));
    }
    if on.chat {
        features.push(Arc::new(ChatFeature::new(&topics.chat, &topics.message)));
    }
    if on.auto_reply {
        features.push(Arc::new(AutoReplyFeature::new(
            &topics.auto_reply,
            settings.auto_reply.delay_ms,
            Arc::clone(session),
        )));
    }
    if on.keyboard {
        features.push(Arc::new(KeyboardFeature::new(
            &topics.keyboard,
            Arc::clone(&drivers.keyboard),
        )));
    }
    if on.joystick {
        features.push(Arc::new(JoystickFeature::new(
            &topics.joystick,
            settings.interfaces.button_count,
            Arc::clone(&drivers.joystick),
        )));
    }
    if on.audio {
        let deck = AudioDeck::new(
            Arc::clone(&drivers.audio),
            &settings.audio.presets_dir,
            Duration::from_millis(settings.audio.fade_ms),
        );
        features.push(Arc::new(AudioFeature::new(&topics.sound_effect, deck)));
    }
    if on.application {
        features.push(Arc::new(ApplicationFeature::new(
            &topics.application,
            Arc::clone(&drivers.launcher),
        )));
    }
    features
}

fn connect_options(settings: &NoxySettings, bridge: &str, clean_session: bool) -> ConnectOptions {
    ConnectOptions {
        broker_address: settings.mqtt.broker_address.clone(),
        port: settings.mqtt.port,
        client_id: format!("{}-{}", settings.mqtt.client_id_prefix, bridge),
        clean_session,
        keep_alive: settings.mqtt.keep_alive(),
        connect_timeout: settings.mqtt.connect_timeout(),
    }
}

fn retry_policy(settings: &NoxySettings) -> RetryPolicy {
    RetryPolicy {
        max_retries: settings.reconnect.max_retries,
        initial_delay: Duration::from_secs(settings.reconnect.initial_delay_secs),
        max_delay: Duration::from_secs(settings.reconnect.max_delay_secs),
    }
}
