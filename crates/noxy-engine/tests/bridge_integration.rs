//! End-to-end bridge instances over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use noxy_bus::{Connection, MockTransport};
use noxy_core::testing::{Delivery, RecordingSession};
use noxy_core::{
    BusTransport, ChatRole, ClientMessage, ConnectOptions, QoS, SessionEvent, SessionHost,
    TriggerArgument,
};
use noxy_engine::features::{ActionFeature, ChatFeature};
use noxy_engine::{BridgeEngine, DuplicateCache, Feature};

const ACTION_TOPIC: &str = "/noxyred/action";
const TRIGGER_TOPIC: &str = "/noxyred/trigger";
const ADD_WAVE: &str = r#"{"Action":"add","Name":"wave","Timing":"Manual"}"#;
const REMOVE_WAVE: &str = r#"{"Action":"remove","Name":"wave"}"#;

struct Bridge {
    mock: Arc<MockTransport>,
    session: Arc<RecordingSession>,
    engine: BridgeEngine,
    events: broadcast::Sender<SessionEvent>,
}

impl Bridge {
    fn new(feature: impl FnOnce(Arc<dyn SessionHost>) -> Arc<dyn Feature>, dedup: Option<DuplicateCache>) -> Self {
        let mock = Arc::new(MockTransport::new());
        let session = Arc::new(RecordingSession::new());
        let connection = Arc::new(Connection::new(
            mock.clone() as Arc<dyn BusTransport>,
            ConnectOptions::default(),
            QoS::AtLeastOnce,
        ));
        let feature = feature(session.clone() as Arc<dyn SessionHost>);
        let engine = BridgeEngine::new(feature, connection, session.clone(), dedup);
        let (events, _) = broadcast::channel(64);
        Self {
            mock,
            session,
            engine,
            events,
        }
    }

    fn actions(dedup: Option<DuplicateCache>) -> Self {
        Self::new(
            |session| -> Arc<dyn Feature> {
                Arc::new(ActionFeature::new(ACTION_TOPIC, TRIGGER_TOPIC, session))
            },
            dedup,
        )
    }

    async fn start(&self) {
        self.engine.start(self.events.subscribe()).await.unwrap();
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn registered_action_reaches_the_session() {
    let bridge = Bridge::actions(None);
    bridge.start().await;

    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| bridge.session.count() == 1).await;

    match &bridge.session.messages()[0] {
        ClientMessage::UpdateActions {
            context_key,
            actions,
            ..
        } => {
            assert_eq!(context_key, "Actions");
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].name, "wave");
        }
        other => panic!("unexpected message: {other:?}"),
    }
    bridge.engine.shutdown().await;
}

#[tokio::test]
async fn invalid_payload_does_not_stop_the_bridge() {
    let bridge = Bridge::actions(None);
    bridge.start().await;

    bridge.mock.inject(ACTION_TOPIC, "{not json");
    bridge.mock.inject(ACTION_TOPIC, r#"{"Action":"add","Name":"x","Timing":"Soon"}"#);
    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| bridge.session.count() == 1).await;
    assert!(bridge.engine.is_running());
    bridge.engine.shutdown().await;
}

#[tokio::test]
async fn triggers_are_published_on_the_trigger_topic() {
    let bridge = Bridge::actions(None);
    bridge.start().await;

    bridge
        .events
        .send(SessionEvent::ActionTrigger {
            name: "wave".into(),
            role: ChatRole::Assistant,
            layer: None,
            arguments: vec![TriggerArgument::new("hand", "left")],
        })
        .unwrap();
    wait_until(|| !bridge.mock.published_on(TRIGGER_TOPIC).is_empty()).await;
    assert_eq!(bridge.mock.published_on(TRIGGER_TOPIC), vec!["wave:hand:left"]);
    bridge.engine.shutdown().await;
}

#[tokio::test]
async fn duplicates_inside_window_are_dropped() {
    let bridge = Bridge::actions(Some(DuplicateCache::new(Duration::from_secs(30))));
    bridge.start().await;

    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    bridge.mock.inject(ACTION_TOPIC, REMOVE_WAVE);
    wait_until(|| bridge.session.count() == 2).await;

    let messages = bridge.session.messages();
    assert!(matches!(&messages[1], ClientMessage::UpdateActions { actions, .. } if actions.is_empty()));
    bridge.engine.shutdown().await;
}

#[tokio::test]
async fn dropped_link_reconnects_and_resubscribes() {
    let bridge = Bridge::actions(None);
    bridge.start().await;
    assert_eq!(bridge.mock.subscriptions().len(), 1);

    bridge.mock.drop_link("broker restarted");
    wait_until(|| bridge.mock.subscriptions().len() == 2).await;
    assert_eq!(bridge.mock.connect_calls(), 2);
    assert!(bridge.engine.is_connected());

    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| bridge.session.count() == 1).await;
    bridge.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_only_that_instance() {
    let failing = Bridge::actions(None);
    let healthy = Bridge::actions(None);
    failing.mock.fail_next_connects(6);

    let err = failing
        .engine
        .start(failing.events.subscribe())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(!failing.engine.is_running());

    healthy.start().await;
    healthy.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| healthy.session.count() == 1).await;
    assert!(healthy.engine.is_running());
    healthy.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_exhaustion_shuts_the_instance_down() {
    let bridge = Bridge::actions(None);
    bridge.start().await;

    bridge.mock.fail_next_connects(6);
    bridge.mock.drop_link("broker gone");
    tokio::time::timeout(Duration::from_secs(600), bridge.engine.stopped())
        .await
        .unwrap();
    assert!(!bridge.engine.is_running());
    assert_eq!(bridge.mock.connect_calls(), 7);
}

#[tokio::test]
async fn closed_event_channel_keeps_bus_traffic_flowing() {
    let bridge = Bridge::actions(None);
    let events = bridge.events.subscribe();
    bridge.engine.start(events).await.unwrap();
    drop(bridge.events);

    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| bridge.session.count() == 1).await;
    bridge.engine.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_releases_state() {
    let bridge = Bridge::actions(None);
    bridge.start().await;
    bridge.mock.inject(ACTION_TOPIC, ADD_WAVE);
    wait_until(|| bridge.session.count() == 1).await;

    bridge.engine.shutdown().await;
    bridge.engine.shutdown().await;
    assert!(!bridge.engine.is_running());
    assert!(!bridge.engine.is_connected());
    assert_eq!(bridge.mock.disconnect_calls(), 1);

    // Nothing reaches the session once stopped.
    bridge.mock.inject(ACTION_TOPIC, REMOVE_WAVE);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bridge.session.count(), 1);
}

#[tokio::test]
async fn chat_messages_are_injected_when_idle() {
    let bridge = Bridge::new(
        |_| -> Arc<dyn Feature> { Arc::new(ChatFeature::new("/noxyred/chat", "/noxyred/message")) },
        None,
    );
    bridge.start().await;
    assert_eq!(bridge.engine.name(), "chat");

    bridge.mock.inject("/noxyred/message", "Hello from the bus");
    wait_until(|| bridge.session.count() == 1).await;
    let (delivery, message) = bridge.session.sent().remove(0);
    assert_eq!(delivery, Delivery::WhenIdle);
    assert!(matches!(message, ClientMessage::Send { text, .. } if text == "Hello from the bus"));
    bridge.engine.shutdown().await;
}
