//! End-to-end tests against a running gateway with an in-process broker.

use broker_client::{Broker, MemoryBroker};
use futures::{SinkExt, StreamExt};
use gateway::{create_router, AppState, Confirmation, ForwardPolicy, RelayConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CHANNEL: &str = "gas-price";
const WAIT: Duration = Duration::from_secs(5);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_gateway(assets: Option<&Path>) -> (SocketAddr, MemoryBroker) {
    let broker = MemoryBroker::new();
    let relay = RelayConfig {
        channel: CHANNEL.to_string(),
        poll_interval: Duration::from_millis(20),
        forward_policy: ForwardPolicy::All,
    };
    let state = Arc::new(AppState::new(Arc::new(broker.clone()), relay));
    let app = create_router(state, assets);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, broker)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/v1/subscribe", addr))
        .await
        .unwrap();
    ws
}

async fn send(ws: &mut Client, json: &str) {
    ws.send(Message::Text(json.to_string().into())).await.unwrap();
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("connection ended")
            .unwrap();
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn next_confirmation(ws: &mut Client) -> Confirmation {
    serde_json::from_str(&next_text(ws).await).unwrap()
}

async fn active_connections(addr: SocketAddr) -> u64 {
    let stats: serde_json::Value = reqwest::get(format!("http://{}/v1/stat", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    stats["active"].as_u64().unwrap()
}

async fn wait_for_active(addr: SocketAddr, expected: u64) {
    tokio::time::timeout(WAIT, async {
        while active_connections(addr).await != expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("active connections never reached {}", expected));
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let (addr, broker) = spawn_gateway(None).await;
    let mut ws = connect(addr).await;

    send(&mut ws, r#"{"type":"subscription","field":"fast","operator":"<","threshold":30}"#).await;
    let subscribed = next_confirmation(&mut ws).await;
    assert_eq!(subscribed.code, 1);
    assert_eq!(subscribed.message, "Subscribed to `fast < 30`");

    send(&mut ws, r#"{"type":"subscription","field":"fast","operator":"<","threshold":30}"#).await;
    assert_eq!(
        next_confirmation(&mut ws).await,
        Confirmation {
            code: 0,
            message: "Already Subscribed".to_string()
        }
    );

    let update = r#"{"fast":21,"fastest":33,"safeLow":8,"average":15}"#;
    broker.publish(CHANNEL, update).await.unwrap();
    assert_eq!(next_text(&mut ws).await, update);

    send(&mut ws, r#"{"type":"unsubscription","field":"fast","operator":"<","threshold":30}"#).await;
    let unsubscribed = next_confirmation(&mut ws).await;
    assert_eq!(unsubscribed.code, 1);
    assert_eq!(unsubscribed.message, "Unsubscribed from `fast < 30`");

    send(&mut ws, r#"{"type":"unsubscription","field":"average","operator":"==","threshold":10}"#).await;
    assert_eq!(
        next_confirmation(&mut ws).await,
        Confirmation {
            code: 0,
            message: "Not Subscribed".to_string()
        }
    );

    assert_eq!(broker.subscribe_count(), 1);
    assert_eq!(broker.unsubscribe_count(), 1);

    ws.close(None).await.unwrap();
    wait_for_active(addr, 0).await;
}

#[tokio::test]
async fn test_bad_request_closes_connection() {
    let (addr, _broker) = spawn_gateway(None).await;
    let mut ws = connect(addr).await;
    wait_for_active(addr, 1).await;

    send(&mut ws, r#"{"type":"subscription","field":"bogus","operator":"<","threshold":30}"#).await;
    assert_eq!(
        next_confirmation(&mut ws).await,
        Confirmation {
            code: 0,
            message: "Bad Subscription Request".to_string()
        }
    );

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(other)) => panic!("unexpected message: {:?}", other),
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the connection");

    wait_for_active(addr, 0).await;
}

#[tokio::test]
async fn test_many_connections_return_to_zero() {
    let (addr, broker) = spawn_gateway(None).await;

    let mut clients = futures::future::join_all((0..100).map(|_| connect(addr))).await;
    futures::future::join_all(clients.iter_mut().enumerate().map(|(i, ws)| async move {
        let json = format!(
            r#"{{"type":"subscription","field":"average","operator":">","threshold":{}}}"#,
            i + 1
        );
        send(ws, &json).await;
        assert!(next_confirmation(ws).await.is_success());
    }))
    .await;

    assert_eq!(active_connections(addr).await, 100);
    assert_eq!(broker.active_subscriptions(), 100);

    futures::future::join_all(clients.iter_mut().map(|ws| ws.close(None))).await;
    drop(clients);

    wait_for_active(addr, 0).await;
    tokio::time::timeout(WAIT, async {
        while broker.active_subscriptions() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("broker subscriptions were not released");
    assert_eq!(broker.unsubscribe_count(), 100);
}

#[tokio::test]
async fn test_plain_request_is_not_upgraded() {
    let (addr, _broker) = spawn_gateway(None).await;

    let response = reqwest::get(format!("http://{}/v1/subscribe", addr))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(active_connections(addr).await, 0);
}

#[tokio::test]
async fn test_serves_assets() {
    let dir = std::env::temp_dir().join(format!("gateway-assets-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<h1>gas prices</h1>").unwrap();

    let (addr, _broker) = spawn_gateway(Some(&dir)).await;
    let body = reqwest::get(format!("http://{}/", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "<h1>gas prices</h1>");

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    std::fs::remove_dir_all(&dir).ok();
}
