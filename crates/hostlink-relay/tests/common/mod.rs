//! Shared test helpers
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hostlink_core::{codec, Message};
use hostlink_relay::{RelayConfig, RelayServer};
use hostlink_transport::{
    Transport, TransportError, TransportEvent, TransportReceiver, TransportSender,
    TransportServer, WebSocketReceiver, WebSocketSender, WebSocketTransport,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// In-memory sender that records every frame handed to it
pub struct MockSender {
    pub sent: mpsc::UnboundedSender<Bytes>,
    pub connected: Arc<AtomicBool>,
}

impl MockSender {
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                sent: tx,
                connected: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (sender, rx) = Self::pair();
        (Arc::new(sender), rx)
    }
}

#[async_trait]
impl TransportSender for MockSender {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent
            .send(data)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory receiver fed by a test-held event channel
pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl MockReceiver {
    pub fn pair() -> (mpsc::UnboundedSender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// In-memory transport server; the test hands it connections through a
/// channel, which gives exact control over when an accept resolves
pub struct MockServer {
    incoming: mpsc::UnboundedReceiver<(MockSender, MockReceiver, SocketAddr)>,
}

impl MockServer {
    pub fn new() -> (
        Self,
        mpsc::UnboundedSender<(MockSender, MockReceiver, SocketAddr)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { incoming: rx }, tx)
    }

    pub fn peer_addr() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }
}

#[async_trait]
impl TransportServer for MockServer {
    type Sender = MockSender;
    type Receiver = MockReceiver;

    async fn accept(&mut self) -> Result<(MockSender, MockReceiver, SocketAddr), TransportError> {
        match self.incoming.recv().await {
            Some(conn) => Ok(conn),
            // Channel closed: behave like a listener with no more
            // connections, pending until the accept loop is stopped
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(Self::peer_addr())
    }
}

pub async fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a relay in the background and return (relay, ws url)
pub async fn start_relay(config: RelayConfig) -> (Arc<RelayServer>, String) {
    let port = find_available_port().await;
    let addr = format!("127.0.0.1:{}", port);

    let relay = Arc::new(RelayServer::new(config));
    {
        let relay = relay.clone();
        let addr = addr.clone();
        tokio::spawn(async move {
            let _ = relay.serve_websocket(&addr).await;
        });
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    (relay, format!("ws://{}", addr))
}

/// A connected test client
pub struct TestClient {
    pub sender: WebSocketSender,
    pub receiver: WebSocketReceiver,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect(url).await.unwrap();
        Self { sender, receiver }
    }

    pub async fn send(&self, message: &Message) {
        self.sender.send(codec::encode(message).unwrap()).await.unwrap();
    }

    pub async fn send_raw(&self, raw: &'static [u8]) {
        self.sender.send(Bytes::from_static(raw)).await.unwrap();
    }

    /// Next decoded message, within two seconds
    pub async fn recv(&mut self) -> Message {
        self.try_recv(Duration::from_secs(2))
            .await
            .expect("expected a message")
    }

    /// Next decoded message within `wait`, or None
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Message> {
        timeout(wait, async {
            loop {
                match self.receiver.recv().await? {
                    TransportEvent::Data(data) => return codec::decode(&data).ok(),
                    TransportEvent::Connected => continue,
                    TransportEvent::Disconnected { .. } | TransportEvent::Error(_) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    /// Consume the proactive welcome, returning the connection id
    pub async fn expect_welcome(&mut self) -> String {
        match self.recv().await {
            Message::Welcome(welcome) => welcome.connection_id,
            other => panic!("expected welcome, got {:?}", other),
        }
    }
}
