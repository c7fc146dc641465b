//! WebSocket transport implementation
//!
//! Frames are JSON text (the panel peer sends `JSON.stringify` over a
//! browser WebSocket). Each connection gets a dedicated writer task
//! fed by an mpsc channel, so writes to one socket are serialized.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::server::{Request as HsRequest, Response as HsResponse},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

use hostlink_core::WS_SUBPROTOCOL;

const CHANNEL_CAPACITY: usize = 100;

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

impl WebSocketSender {
    fn to_ws_message(data: Bytes) -> Result<WsMessage> {
        // Wire frames are JSON, therefore UTF-8
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::SendFailed(format!("frame is not UTF-8: {e}")))?;
        Ok(WsMessage::Text(text))
    }
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(Self::to_ws_message(data)?)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Spawn the writer and reader tasks for an established socket and
/// return the channel-backed sender/receiver pair.
fn spawn_io_tasks<S>(ws_stream: S) -> (WebSocketSender, WebSocketReceiver)
where
    S: futures_util::Stream<
            Item = std::result::Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
        > + futures_util::Sink<WsMessage>
        + Send
        + 'static,
    <S as futures_util::Sink<WsMessage>>::Error: std::fmt::Display + Send,
{
    let (write, read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task: the per-connection write queue
    tokio::spawn(async move {
        let mut write = write;
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let mut read = read;

        let _ = event_tx.send(TransportEvent::Connected).await;

        while let Some(result) = read.next().await {
            match result {
                Ok(msg) => match msg {
                    WsMessage::Text(text) => {
                        let _ = event_tx.send(TransportEvent::Data(Bytes::from(text))).await;
                    }
                    WsMessage::Binary(data) => {
                        // Tolerated; some clients send JSON as binary
                        let _ = event_tx.send(TransportEvent::Data(Bytes::from(data))).await;
                    }
                    WsMessage::Close(frame) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
                        break;
                    }
                    // Ping/Pong are answered by tungstenite itself
                    _ => {}
                },
                Err(e) => {
                    warn!("WebSocket read error: {}", e);
                    let _ = event_tx
                        .send(TransportEvent::Disconnected {
                            reason: Some(e.to_string()),
                        })
                        .await;
                    break;
                }
            }
        }

        *connected_read.lock() = false;
    });

    (
        WebSocketSender {
            tx: send_tx,
            connected,
        },
        WebSocketReceiver { rx: event_rx },
    )
}

/// Client-side WebSocket transport (used by the panel simulator in
/// tests and by tooling)
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        debug!("Connecting to WebSocket: {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            WS_SUBPROTOCOL
                .parse()
                .map_err(|e| TransportError::InvalidUrl(format!("{e}")))?,
        );

        let (ws_stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_io_tasks(ws_stream))
    }
}

/// WebSocket server
#[derive(Debug)]
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
}

impl WebSocketServer {
    /// Bind the listener. Failure here is fatal to startup.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed {
                addr: addr.to_string(),
                source: e,
            })?;

        info!("WebSocket server listening on {}", addr);

        Ok(Self { listener })
    }
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("Accepted TCP connection from {}", addr);

        // Upgrade to WebSocket, negotiating the hostlink subprotocol
        // when the client requests it
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &HsRequest, mut response: HsResponse| {
                if let Some(protocols) = req.headers().get("Sec-WebSocket-Protocol") {
                    if let Ok(protocols_str) = protocols.to_str() {
                        let requested: Vec<&str> =
                            protocols_str.split(',').map(|s| s.trim()).collect();
                        if requested.contains(&WS_SUBPROTOCOL) {
                            if let Ok(value) = WS_SUBPROTOCOL.parse() {
                                response
                                    .headers_mut()
                                    .insert("Sec-WebSocket-Protocol", value);
                            }
                        }
                    }
                }
                Ok(response)
            },
        )
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("WebSocket client connected from {}", addr);

        let (sender, receiver) = spawn_io_tasks(ws_stream);
        Ok((sender, receiver, addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}
