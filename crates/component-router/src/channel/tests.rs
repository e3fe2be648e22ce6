use super::*;
use crate::adapters::PlaintextCipher;
use crate::test_utils::{settle, RecordingCallback, ScriptedTransport};
use serde_json::json;
use std::time::Duration;

fn options() -> ChannelOptions {
    ChannelOptions {
        has_salt: false,
        cipher: Arc::new(PlaintextCipher),
        messages: Arc::new(ErrorMessages::default()),
    }
}

fn channel() -> (Channel, mpsc::UnboundedReceiver<ChannelEvent>) {
    let (events, receiver) = mpsc::unbounded_channel();
    let channel = Channel::new(
        "billing",
        Endpoint::new("10.0.0.5", 9000),
        options(),
        Handle::current(),
        events,
    );
    (channel, receiver)
}

fn request(request_id: RequestId, timeout: Duration) -> PendingRequest {
    PendingRequest {
        component: "billing".into(),
        rpc: "billing.charge".into(),
        request_id,
        timeout,
        params: Some(crate::domain::RequestParams::new().with("amount", 10)),
        callback: RecordingCallback::shared(),
    }
}

fn failure_code(event: ChannelEvent) -> (Option<RequestId>, i32) {
    match event {
        ChannelEvent::Failure {
            request_id,
            failure,
        } => (request_id, failure.code),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connect_send_and_receive() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    assert_eq!(channel.status(), ChannelStatus::None);

    channel.connect(&transport);
    assert_eq!(channel.status(), ChannelStatus::Connecting);

    let connection = transport.latest_to("10.0.0.5", 9000).unwrap();
    connection.accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
    assert_eq!(channel.status(), ChannelStatus::Connected);

    channel.send(&request(42, Duration::from_secs(5))).unwrap();
    let sent = connection.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reqid, 42);
    assert_eq!(sent[0].rpc, "billing.charge");
    assert_eq!(sent[0].data, "{\"amount\":10}");

    connection.reply(42, json!({"status": 200, "balance": 7}));
    assert_eq!(
        events.recv().await.unwrap(),
        ChannelEvent::Response(Response::new(42, json!({"status": 200, "balance": 7})))
    );
}

#[tokio::test]
async fn test_send_before_connect_is_rejected() {
    let (channel, _events) = channel();
    let failure = channel.send(&request(1, Duration::from_secs(5))).unwrap_err();
    assert_eq!(failure.code, codes::NETWORK_ERROR);
}

#[tokio::test]
async fn test_refused_transport_reports_connection_error() {
    let transport = ScriptedTransport::new();
    transport.refuse_connections(true);
    let (channel, mut events) = channel();

    channel.connect(&transport);

    assert_eq!(channel.status(), ChannelStatus::Failed);
    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (None, codes::CONNECTION_ERROR)
    );
}

#[tokio::test]
async fn test_connect_failures() {
    let transport = ScriptedTransport::new();

    let (channel, mut events) = channel();
    channel.connect(&transport);
    transport.connections()[0].fail_connect();
    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (None, codes::CONNECTION_ERROR)
    );
    assert_eq!(channel.status(), ChannelStatus::Failed);

    let (channel, mut events) = self::channel();
    channel.connect(&transport);
    transport.connections()[1].time_out_connect();
    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (None, codes::CONNECTION_TIMEOUT)
    );
    assert!(transport.connections()[1].is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    channel.connect(&transport);
    transport.connections()[0].accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

    channel.send(&request(7, Duration::from_secs(5))).unwrap();

    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (Some(7), codes::REQUEST_TIMEOUT)
    );
}

#[tokio::test(start_paused = true)]
async fn test_response_cancels_deadline() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    channel.connect(&transport);
    let connection = transport.connections()[0].clone();
    connection.accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

    channel.send(&request(7, Duration::from_secs(5))).unwrap();
    tokio::time::sleep(Duration::from_secs(4)).await;
    connection.reply(7, json!({"status": 200}));
    assert!(matches!(events.recv().await, Some(ChannelEvent::Response(_))));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_undecodable_responses() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    channel.connect(&transport);
    let connection = transport.connections()[0].clone();
    connection.accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

    connection.push_frame(json!({"response": "{}"}));
    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (None, codes::RESPONSE_ERROR)
    );

    connection.push_frame(json!({"reqid": 3, "response": "not json"}));
    assert_eq!(
        failure_code(events.recv().await.unwrap()),
        (Some(3), codes::RESPONSE_ERROR)
    );
}

#[tokio::test]
async fn test_app_disconnect() {
    let transport = ScriptedTransport::new();
    transport.manual_close(true);
    let (channel, mut events) = channel();
    channel.connect(&transport);
    let connection = transport.connections()[0].clone();
    connection.accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);

    channel.disconnect();
    assert_eq!(channel.status(), ChannelStatus::Disconnecting);
    assert!(channel.is_disconnected_by_app());
    assert!(connection.is_closed());
    assert!(channel.send(&request(1, Duration::from_secs(5))).is_err());

    connection.finish_close();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Disconnected);
    assert_eq!(channel.status(), ChannelStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_drops_deadlines() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    channel.connect(&transport);
    let connection = transport.connections()[0].clone();
    connection.accept();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
    channel.send(&request(9, Duration::from_secs(5))).unwrap();

    connection.drop_connection();
    assert_eq!(events.recv().await.unwrap(), ChannelEvent::Disconnected);
    assert_eq!(channel.status(), ChannelStatus::Disconnected);
    assert!(!channel.is_disconnected_by_app());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_release_is_silent() {
    let transport = ScriptedTransport::new();
    let (channel, mut events) = channel();
    channel.connect(&transport);
    let connection = transport.connections()[0].clone();

    channel.release();
    settle().await;

    assert!(connection.is_closed());
    assert_eq!(channel.status(), ChannelStatus::Disconnected);
    assert!(events.try_recv().is_err());
}
