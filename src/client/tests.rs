use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ConnectionManager, ConnectionOptions, ConnectionState, Observer};
use crate::codec::{self, ChatMessage, MessageKind};
use crate::registry::MessageHandler;
use crate::transport::mock::{Call, MockConnector};
use crate::utils::error::{ClientError, TransportError, ProtocolError};
use serde_json::json;

const URL: &str = "http://localhost:8080/ws";
const PUBLIC: &str = "/topic/public";

#[derive(Default)]
struct RecordingObserver {
    transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
    errors: Mutex<Vec<&'static str>>,
}

impl Observer for RecordingObserver {
    fn on_state_change(&self, from: ConnectionState, to: ConnectionState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_error(&self, error: &ClientError) {
        let kind = match error {
            ClientError::Transport(_) => "transport",
            ClientError::Protocol(_) => "protocol",
            ClientError::Decode { .. } => "decode",
            ClientError::Usage(_) => "usage",
        };
        self.errors.lock().unwrap().push(kind);
    }
}

impl RecordingObserver {
    fn errors(&self) -> Vec<&'static str> {
        self.errors.lock().unwrap().clone()
    }
}

struct Harness {
    manager: ConnectionManager<MockConnector>,
    connector: MockConnector,
    observer: Arc<RecordingObserver>,
    received: Arc<Mutex<Vec<ChatMessage>>>,
    handler: MessageHandler,
}

fn harness() -> Harness {
    let connector = MockConnector::new();
    let observer = Arc::new(RecordingObserver::default());
    let manager = ConnectionManager::new(connector.clone(), ConnectionOptions::default())
        .with_observer(observer.clone());
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handler: MessageHandler = Arc::new(move |msg: ChatMessage| sink.lock().unwrap().push(msg));
    Harness {
        manager,
        connector,
        observer,
        received,
        handler,
    }
}

impl Harness {
    fn connect(&mut self, topics: &[&str]) {
        self.manager
            .connect(URL, topics.iter().copied(), self.handler.clone());
    }

    /// Plays the server accepting the handshake on `session`.
    fn accept(&mut self, session: usize) {
        self.connector.sink(session).connected();
        self.manager.process_pending();
    }

    fn deliver(&mut self, session: usize, topic: &str, body: &str) {
        let handle = self
            .connector
            .handle_for(session, topic)
            .expect("topic not subscribed");
        self.connector.sink(session).message(handle, body);
        self.manager.process_pending();
    }

    fn drop_transport(&mut self, session: usize) {
        self.connector
            .sink(session)
            .failed(TransportError::closed("connection reset"));
        self.manager.process_pending();
    }

    fn received(&self) -> Vec<ChatMessage> {
        self.received.lock().unwrap().clone()
    }
}

fn chat(content: &str) -> ChatMessage {
    ChatMessage {
        sender: "Joe".to_string(),
        content: content.to_string(),
        timestamp: 1_700_000_000_000,
        kind: MessageKind::Chat,
    }
}

fn wire(content: &str) -> String {
    codec::encode(&chat(content)).unwrap()
}

#[tokio::test]
async fn test_connect_subscribes_only_after_connected() {
    let mut h = harness();
    h.connect(&[PUBLIC]);

    assert_eq!(h.manager.state(), ConnectionState::Connecting);
    assert_eq!(h.connector.opens(), 1);
    assert!(h.connector.live_subscriptions(0).is_empty());

    h.accept(0);

    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert!(h.manager.is_connected());
    assert_eq!(h.connector.live_topics(0), vec![PUBLIC]);
    assert_eq!(h.manager.active_topics(), vec![PUBLIC]);
    assert_eq!(h.manager.url(), Some(URL));
}

#[tokio::test]
async fn test_connect_twice_keeps_one_transport_and_one_handler() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.connect(&[PUBLIC]);
    h.accept(0);
    h.connect(&[PUBLIC]);

    assert_eq!(h.connector.opens(), 1);
    assert_eq!(h.connector.live_subscriptions(0).len(), 1);

    h.deliver(0, PUBLIC, &wire("once"));
    assert_eq!(h.received().len(), 1);
}

#[tokio::test]
async fn test_inbound_message_reaches_handler_intact() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);

    let body = json!({
        "sender": "Joe",
        "content": "hi",
        "timestamp": 1700000000000i64,
        "kind": "CHAT"
    })
    .to_string();
    h.deliver(0, PUBLIC, &body);

    assert_eq!(
        h.received(),
        vec![ChatMessage {
            sender: "Joe".to_string(),
            content: "hi".to_string(),
            timestamp: 1_700_000_000_000,
            kind: MessageKind::Chat,
        }]
    );
}

#[tokio::test]
async fn test_publish_while_connected_writes_frame() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);

    let message = ChatMessage {
        sender: "Joe".to_string(),
        content: "hello".to_string(),
        timestamp: 1_700_000_000_123,
        kind: MessageKind::Chat,
    };
    h.manager.publish("/app/chat.send", &message);

    let sends = h.connector.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, "/app/chat.send");
    assert_eq!(codec::decode(&sends[0].1).unwrap(), message);
}

#[tokio::test]
async fn test_send_message_uses_configured_destination() {
    let connector = MockConnector::new();
    let options = ConnectionOptions {
        send_destination: "/app/room.send".to_string(),
        ..ConnectionOptions::default()
    };
    let mut manager = ConnectionManager::new(connector.clone(), options);
    manager.connect(URL, [PUBLIC], Arc::new(|_: ChatMessage| {}));
    connector.sink(0).connected();
    manager.process_pending();

    manager.send_message(&chat("hey"));

    assert_eq!(connector.sends()[0].0, "/app/room.send");
}

#[tokio::test]
async fn test_publish_is_gated_on_connection() {
    let mut h = harness();

    // before any connect
    h.manager.publish("/app/chat.send", &chat("early"));
    // while the handshake is still pending
    h.connect(&[PUBLIC]);
    h.manager.publish("/app/chat.send", &chat("connecting"));
    // after disconnect
    h.accept(0);
    h.manager.disconnect();
    h.manager.publish("/app/chat.send", &chat("late"));

    assert!(h.connector.sends().is_empty());
    assert_eq!(h.observer.errors(), vec!["usage", "usage", "usage"]);
}

#[tokio::test]
async fn test_failed_send_is_reported_not_raised() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);
    h.connector.fail_sends(true);

    h.manager.send_message(&chat("lost"));

    assert_eq!(h.observer.errors(), vec!["transport"]);
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_decode_failure_is_isolated_to_one_frame() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);

    let frames = vec![
        wire("1"),
        wire("2"),
        "{\"sender\":\"Joe\",\"content\":3}".to_string(),
        wire("4"),
        wire("5"),
    ];
    for frame in &frames {
        h.deliver(0, PUBLIC, frame);
    }

    let contents: Vec<String> = h.received().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["1", "2", "4", "5"]);
    assert_eq!(h.observer.errors(), vec!["decode"]);
    assert_eq!(h.manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_protocol_error_keeps_connection() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);

    h.connector
        .sink(0)
        .protocol_error(ProtocolError::MalformedFrame("garbage".into()));
    h.manager.process_pending();

    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert_eq!(h.observer.errors(), vec!["protocol"]);
    assert!(!h.connector.is_closed(0));
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_replayed_after_reconnect() {
    let mut h = harness();
    let topics = ["/topic/a", "/topic/b", PUBLIC];
    h.connect(&topics);
    h.accept(0);

    h.drop_transport(0);
    assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
    assert!(h.connector.is_closed(0));
    assert!(h.manager.active_topics().is_empty());

    // fires the retry timer once the paused clock auto-advances
    h.manager.process_next().await;
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
    assert_eq!(h.connector.opens(), 2);

    h.accept(1);
    assert_eq!(h.connector.live_topics(1), vec!["/topic/a", "/topic/b", PUBLIC]);

    h.deliver(1, PUBLIC, &wire("after"));
    assert_eq!(h.received().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_configured_delay() {
    let connector = MockConnector::new();
    let options = ConnectionOptions {
        reconnect_delay: Duration::from_millis(250),
        ..ConnectionOptions::default()
    };
    let mut manager = ConnectionManager::new(connector.clone(), options);
    manager.connect(URL, [PUBLIC], Arc::new(|_: ChatMessage| {}));
    connector.sink(0).failed(TransportError::Unreachable("refused".into()));
    manager.process_pending();

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.process_pending();
    assert_eq!(connector.opens(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.process_pending();
    assert_eq!(connector.opens(), 2);
    assert_eq!(manager.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_retry_loop_is_unbounded() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    for attempt in 0..5 {
        h.drop_transport(attempt);
        h.manager.process_next().await;
    }
    assert_eq!(h.connector.opens(), 6);
    assert_eq!(h.manager.state(), ConnectionState::Connecting);
    assert_eq!(h.manager.generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refused_open_schedules_retry() {
    let mut h = harness();
    h.connector.refuse_open(true);
    h.connect(&[PUBLIC]);

    assert_eq!(h.manager.state(), ConnectionState::Reconnecting);
    assert_eq!(h.observer.errors(), vec!["transport"]);
    {
        use ConnectionState::*;
        assert_eq!(
            *h.observer.transitions.lock().unwrap(),
            vec![(Idle, Connecting), (Connecting, Reconnecting)]
        );
    }

    h.connector.refuse_open(false);
    h.manager.process_next().await;

    assert_eq!(h.manager.state(), ConnectionState::Connecting);
    h.accept(0);
    assert_eq!(h.connector.live_topics(0), vec![PUBLIC]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_reconnect_attempt_wins() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);
    h.drop_transport(0);
    h.manager.process_next().await;
    assert_eq!(h.connector.opens(), 2);

    h.manager.disconnect();

    // the in-flight attempt now "succeeds" and the server pushes a message
    h.connector.sink(1).connected();
    h.connector
        .sink(1)
        .message(crate::transport::SubscriptionHandle::new("mock-1"), wire("ghost"));
    h.manager.process_pending();

    assert_eq!(h.manager.state(), ConnectionState::Closed);
    assert!(h.connector.live_subscriptions(1).is_empty());
    assert!(h.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.drop_transport(0);
    assert_eq!(h.manager.state(), ConnectionState::Reconnecting);

    h.manager.disconnect();
    tokio::time::sleep(Duration::from_secs(30)).await;
    h.manager.process_pending();

    assert_eq!(h.connector.opens(), 1);
    assert_eq!(h.manager.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_late_frames_from_replaced_session_are_ignored() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);
    let old_handle = h.connector.handle_for(0, PUBLIC).unwrap();
    h.drop_transport(0);
    h.manager.process_next().await;
    h.accept(1);

    h.connector.sink(0).message(old_handle, wire("from the dead"));
    h.connector.sink(0).connected();
    h.connector
        .sink(0)
        .failed(TransportError::closed("late close"));
    h.manager.process_pending();

    assert!(h.received().is_empty());
    assert_eq!(h.manager.state(), ConnectionState::Connected);
    assert_eq!(h.connector.opens(), 2);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut h = harness();
    h.manager.disconnect();
    assert_eq!(h.manager.state(), ConnectionState::Closed);

    h.connect(&[PUBLIC]);
    h.accept(0);
    let generation = h.manager.generation();
    h.manager.disconnect();
    h.manager.disconnect();

    assert_eq!(h.manager.state(), ConnectionState::Closed);
    assert_eq!(h.manager.generation(), generation + 2);
    let closes = h
        .connector
        .calls(0)
        .into_iter()
        .filter(|c| *c == Call::Close)
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_disconnect_unsubscribes_and_connect_restores() {
    let mut h = harness();
    h.connect(&["/topic/a", "/topic/b"]);
    h.accept(0);

    h.manager.disconnect();
    assert!(h.connector.live_subscriptions(0).is_empty());
    assert_eq!(h.manager.registry().topics(), vec!["/topic/a", "/topic/b"]);

    h.connect(&["/topic/a", "/topic/b"]);
    h.accept(1);
    assert_eq!(h.connector.live_topics(1), vec!["/topic/a", "/topic/b"]);
}

#[tokio::test]
async fn test_reconnect_with_new_topics_replaces_old_bindings() {
    let mut h = harness();
    let stale = Arc::new(Mutex::new(Vec::new()));
    let stale_sink = stale.clone();
    h.manager.connect(
        URL,
        ["/topic/a"],
        Arc::new(move |msg: ChatMessage| stale_sink.lock().unwrap().push(msg)),
    );
    h.accept(0);
    h.manager.subscribe("/topic/pinned", h.handler.clone());
    h.manager.disconnect();

    h.connect(&["/topic/b"]);
    h.accept(1);

    assert_eq!(h.connector.live_topics(1), vec!["/topic/b", "/topic/pinned"]);
    assert!(!h.manager.registry().contains("/topic/a"));

    h.deliver(1, "/topic/b", &wire("fresh"));
    assert_eq!(h.received().len(), 1);
    assert!(stale.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_dispatch_after_disconnect_returns() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);
    let handle = h.connector.handle_for(0, PUBLIC).unwrap();

    // queued before disconnect, applied after
    h.connector.sink(0).message(handle, wire("queued"));
    h.manager.disconnect();
    h.manager.process_pending();

    assert!(h.received().is_empty());
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_while_connected() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);

    h.manager.subscribe("/topic/extra", h.handler.clone());
    assert_eq!(h.connector.live_topics(0), vec!["/topic/extra", PUBLIC]);

    h.manager.unsubscribe(PUBLIC);
    assert_eq!(h.connector.live_topics(0), vec!["/topic/extra"]);
    assert_eq!(h.manager.registry().topics(), vec!["/topic/extra"]);
}

#[tokio::test]
async fn test_subscribe_before_connect_waits_for_connected() {
    let mut h = harness();
    h.manager.subscribe("/topic/early", h.handler.clone());
    assert_eq!(h.connector.opens(), 0);

    h.connect(&[PUBLIC]);
    assert!(h.connector.live_subscriptions(0).is_empty());
    h.accept(0);
    assert_eq!(h.connector.live_topics(0), vec!["/topic/early", PUBLIC]);
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions_are_observed() {
    let mut h = harness();
    h.connect(&[PUBLIC]);
    h.accept(0);
    h.drop_transport(0);
    h.manager.process_next().await;
    h.accept(1);
    h.manager.disconnect();

    use ConnectionState::*;
    assert_eq!(
        *h.observer.transitions.lock().unwrap(),
        vec![
            (Idle, Connecting),
            (Connecting, Connected),
            (Connected, Reconnecting),
            (Reconnecting, Connecting),
            (Connecting, Connected),
            (Connected, Closed),
        ]
    );
}

#[tokio::test]
async fn test_independent_managers_do_not_share_state() {
    let mut first = harness();
    let mut second = harness();
    first.connect(&["/topic/one"]);
    first.accept(0);
    second.connect(&["/topic/two"]);

    assert!(first.manager.is_connected());
    assert_eq!(second.manager.state(), ConnectionState::Connecting);
    assert_eq!(first.connector.live_topics(0), vec!["/topic/one"]);
    assert!(second.connector.live_subscriptions(0).is_empty());
}
