//! End-to-end WebSocket sessions against a bound transport.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use ovenwatch_realtime::{BroadcastOptions, OutboundMessage};

use crate::helpers::TestApp;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp, query: &str) -> Client {
    let url = format!("ws://{}/ws{query}", app.addr());
    let (client, _) = connect_async(url).await.expect("websocket handshake");
    client
}

/// Next text frame as JSON, skipping periodic metrics updates.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame within 5s")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(text.as_str()).expect("json frame");
            if value["type"] != "metrics_update" {
                return value;
            }
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

#[tokio::test]
async fn test_welcome_lists_subscriptions() {
    let app = TestApp::new().start().await;
    let mut client = connect(&app, "?subscriptions=alerts,bad%20topic").await;

    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "welcome");
    assert!(welcome["data"]["connectionId"].as_str().unwrap().starts_with("ws_"));
    assert!(welcome["timestamp"].is_number());

    let stats = app.request("GET", "/stats").await;
    assert_eq!(stats.body["open_connections"], 1);
    assert_eq!(stats.body["subscription_stats"]["alerts"], 1);
    assert!(stats.body["subscription_stats"].get("bad topic").is_none());

    app.shutdown().await;
}

#[tokio::test]
async fn test_ping_pong_and_subscribe() {
    let app = TestApp::new().start().await;
    let mut client = connect(&app, "").await;
    assert_eq!(next_json(&mut client).await["type"], "welcome");

    send_json(&mut client, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    send_json(&mut client, json!({ "type": "subscribe", "subscriptions": ["metrics"] })).await;
    send_json(&mut client, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");

    let stats = app.request("GET", "/stats").await;
    assert_eq!(stats.body["subscription_stats"]["metrics"], 1);

    app.shutdown().await;
}

#[tokio::test]
async fn test_broadcast_reaches_subscribers_only() {
    let app = TestApp::new().start().await;
    let mut subscriber = connect(&app, "?subscriptions=system_health").await;
    let mut bystander = connect(&app, "").await;
    assert_eq!(next_json(&mut subscriber).await["type"], "welcome");
    assert_eq!(next_json(&mut bystander).await["type"], "welcome");

    let registry = app.engine.orchestrator.registry();
    let sent = registry.broadcaster().broadcast_to_subscribers(
        &OutboundMessage::with_data("system_health", json!({ "status": "ok" })),
        "system_health",
    );
    assert_eq!(sent, 1);

    let message = next_json(&mut subscriber).await;
    assert_eq!(message["type"], "system_health");
    assert_eq!(message["data"]["status"], "ok");

    send_json(&mut bystander, json!({ "type": "ping" })).await;
    assert_eq!(next_json(&mut bystander).await["type"], "pong");

    app.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_gets_replay() {
    let app = TestApp::new().start().await;
    let registry = app.engine.orchestrator.registry();
    registry.broadcaster().broadcast(
        &OutboundMessage::with_data("order_status", json!({ "order": 7 })),
        None,
        BroadcastOptions::default(),
    );

    let mut client = connect(&app, "").await;
    assert_eq!(next_json(&mut client).await["type"], "welcome");

    let replayed = next_json(&mut client).await;
    assert_eq!(replayed["type"], "queued_order_status");
    assert_eq!(replayed["data"]["order"], 7);

    app.shutdown().await;
}

#[tokio::test]
async fn test_client_close_evicts() {
    let app = TestApp::new().start().await;
    let mut client = connect(&app, "").await;
    assert_eq!(next_json(&mut client).await["type"], "welcome");
    assert_eq!(app.engine.orchestrator.registry().connection_count(), 1);

    client.close(None).await.expect("close");

    let registry = app.engine.orchestrator.registry().clone();
    timeout(Duration::from_secs(5), async move {
        while registry.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connection evicted after close");

    app.shutdown().await;
}
