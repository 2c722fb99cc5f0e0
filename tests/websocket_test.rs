//! End-to-end tests over a loopback WebSocket server playing the device.

use futures_util::{SinkExt, StreamExt};
use g3link::{Config, Connection, Error};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type DeviceSocket = WebSocketStream<tokio::net::TcpStream>;

/// Accept one client, insisting on the device's path and subprotocol.
async fn accept_device(listener: &TcpListener) -> DeviceSocket {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut resp: Response| {
        let offered = req
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if req.uri().path() != "/websocket" || !offered.split(',').any(|p| p.trim() == "g3api") {
            let mut rejection = ErrorResponse::new(Some("unexpected handshake".to_string()));
            *rejection.status_mut() = StatusCode::BAD_REQUEST;
            return Err(rejection);
        }
        resp.headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("g3api"));
        Ok(resp)
    })
    .await
    .unwrap()
}

/// Minimal device: a serial number, one signal and its unsubscribe.
async fn serve_device(mut ws: DeviceSocket) {
    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let request: Value = serde_json::from_str(&text).unwrap();
        let id = request["id"].clone();
        let path = request["path"].as_str().unwrap_or_default();
        let method = request["method"].as_str().unwrap_or_default();

        let body = match (method, path, &request["body"]) {
            ("GET", "/system.recording-unit-serial", _) => json!("SN123"),
            ("POST", "/recorder:started", Value::Null) => json!("sig-7"),
            ("POST", "/recorder:started", Value::String(sig)) if sig == "sig-7" => json!(true),
            _ => Value::Null,
        };
        let subscribed = body == json!("sig-7");

        let reply = json!({"id": id, "body": body}).to_string();
        if ws.send(Message::Text(reply)).await.is_err() {
            return;
        }
        if subscribed {
            let event = json!({"signal": "sig-7", "body": ["started"]}).to_string();
            if ws.send(Message::Text(event)).await.is_err() {
                return;
            }
        }
    }
}

fn config_for(listener: &TcpListener) -> Config {
    Config {
        hostname: Some(listener.local_addr().unwrap().to_string()),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_request_and_signal_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);
    let server = tokio::spawn(async move {
        let ws = accept_device(&listener).await;
        serve_device(ws).await;
    });

    let conn = Connection::connect(&config).await.unwrap();

    let serial = conn.get("/system.recording-unit-serial", None).await.unwrap();
    assert_eq!(serial, json!("SN123"));

    let (mut events, handle) = conn.subscribe("/recorder:started").await.unwrap();
    assert_eq!(events.signal_id().as_str(), "sig-7");
    assert_eq!(events.recv().await, Some(vec![json!("started")]));

    handle.unsubscribe().await.unwrap();
    assert_eq!(conn.signal_id("/recorder:started"), None);

    conn.close().await;
    assert!(conn.is_closed());
    server.await.unwrap();
}

#[tokio::test]
async fn test_device_close_fails_pending_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);
    tokio::spawn(async move {
        let mut ws = accept_device(&listener).await;
        // Read the request, then hang up without answering.
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    });

    let conn = Connection::connect(&config).await.unwrap();
    let result = conn.get("/recorder.duration", None).await;

    assert!(matches!(result, Err(Error::ConnectionClosed)));
    conn.closed().await;
}

#[tokio::test]
async fn test_connect_without_hostname_fails() {
    let result = Connection::connect(&Config::default()).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn test_connect_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&listener);
    drop(listener);

    let result = Connection::connect(&config).await;
    assert!(matches!(result, Err(Error::Transport(_))));
}
