//! WebSocket transport to the device.
//!
//! The device serves its API at `ws://<host>/websocket` and expects the
//! `g3api` subprotocol. [`connect`] performs the handshake and splits the
//! socket: [`WsWriter`] is the [`FrameSink`], [`WsReader`] the
//! [`FrameSource`], ready for [`Connection::start`](crate::Connection::start).
//! This is the only module that touches `tokio-tungstenite`.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

use crate::transport::{FrameSink, FrameSource};

/// Client socket, plain or TLS.
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has gone away.
    pub async fn send_frame(&mut self, frame: String) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(frame))
            .await
            .context("WebSocket send failed")
    }

    /// Send a close frame and shut the write half.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake cannot be written.
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.context("WebSocket close failed")
    }
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.send_frame(frame).await
    }

    async fn close(&mut self) -> Result<()> {
        WsWriter::close(self).await
    }
}

/// Read half of a WebSocket connection.
///
/// Yields text payloads only. Control frames are handled by tungstenite and
/// skipped here; binary frames must carry UTF-8 text.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsReader {
    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("WebSocket read failed"))),
            };
            match message {
                tungstenite::Message::Text(text) => return Some(Ok(text)),
                tungstenite::Message::Binary(data) => {
                    return Some(
                        String::from_utf8(data).context("binary WebSocket frame is not UTF-8"),
                    );
                }
                tungstenite::Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|cf| (u16::from(cf.code), cf.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    log::info!("[G3 ws] Closed by device (code={}, reason={:?})", code, reason);
                    return None;
                }
                // Pongs are queued by tungstenite and flushed with the next write.
                tungstenite::Message::Ping(_)
                | tungstenite::Message::Pong(_)
                | tungstenite::Message::Frame(_) => {}
            }
        }
    }
}

/// Connect to a WebSocket URL, offering `subprotocols`.
///
/// Builds an HTTP request from `url`, adds a `Sec-WebSocket-Protocol` header
/// when `subprotocols` is non-empty, then performs the handshake. Returns
/// split (writer, reader) halves.
///
/// # Errors
///
/// Returns an error if the URL is invalid, a subprotocol name is not a
/// valid header value, or the WebSocket handshake fails (including the
/// server refusing every offered subprotocol).
pub async fn connect(url: &str, subprotocols: &[&str]) -> Result<(WsWriter, WsReader)> {
    use tungstenite::client::IntoClientRequest;

    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;

    if !subprotocols.is_empty() {
        let offered = subprotocols.join(", ");
        let header_value = tungstenite::http::HeaderValue::from_str(&offered)
            .with_context(|| format!("invalid subprotocol list: {offered}"))?;
        request
            .headers_mut()
            .insert(tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL, header_value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;

    let (sink, stream) = ws_stream.split();

    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}

/// Build the device WebSocket URL from a hostname and path.
///
/// A bare hostname (the device default is its serial number) gets `ws://`;
/// an explicit `http(s)://` or `ws(s)://` prefix is honoured.
#[must_use]
pub fn websocket_url(hostname: &str, path: &str) -> String {
    let base = if hostname.contains("://") {
        http_to_ws_scheme(hostname)
    } else {
        format!("ws://{hostname}")
    };
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
