//! Relay server: lifecycle control and message routing
//!
//! The relay is transport-agnostic; it accepts connections from any
//! [`TransportServer`] implementation. Each accepted connection gets
//! its own tokio task, so a fault while processing one connection's
//! frame never affects another connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hostlink_core::{
    codec, time, ActionResultMessage, Message, PongMessage, RegistrationFailedMessage,
    RegistrationSuccessMessage, WelcomeMessage, PROTOCOL_VERSION,
};
use hostlink_transport::{
    TransportEvent, TransportReceiver, TransportSender, TransportServer, WebSocketServer,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::allowlist::Allowlist;
use crate::broadcast::Broadcaster;
use crate::error::Result;
use crate::pending::PendingRequests;
use crate::registry::{Connection, ConnectionRegistry};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Server identity advertised in `welcome`
    pub server_identity: String,
    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,
    /// Bounded per-connection wait during drain
    pub drain_timeout: Duration,
    /// How long a correlation token stays pending before the origin
    /// gets a failure result
    pub request_timeout: Duration,
    /// Gate domain actions on a completed registration. Off by
    /// default; integrator policy.
    pub require_registration: bool,
    /// Identities permitted to register, with their capability grants
    pub allowlist: Allowlist,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_identity: "Hostlink Relay".to_string(),
            max_connections: 64,
            drain_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            require_registration: false,
            allowlist: Allowlist::default(),
        }
    }
}

/// Lifecycle states of the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Starting,
    Listening,
    Draining,
    Stopped,
}

/// State shared with per-connection tasks
struct Shared {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Broadcaster,
    pending: Arc<PendingRequests>,
}

/// The relay server
pub struct RelayServer {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_connections));
        let broadcaster = Broadcaster::new(registry.clone());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                broadcaster,
                pending: Arc::new(PendingRequests::new()),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
            shutdown_tx,
        }
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Number of in-flight correlation tokens
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Registry handle, shared with per-connection tasks
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.shared.registry.clone()
    }

    /// Broadcaster over this relay's registry
    pub fn broadcaster(&self) -> Broadcaster {
        self.shared.broadcaster.clone()
    }

    /// Bind a WebSocket listener and serve on it.
    ///
    /// Bind failure is fatal and surfaced to the caller; it is never
    /// retried here.
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        *self.lifecycle.lock() = Lifecycle::Starting;
        let server = match WebSocketServer::bind(addr).await {
            Ok(server) => server,
            Err(e) => {
                *self.lifecycle.lock() = Lifecycle::Idle;
                return Err(e.into());
            }
        };
        self.serve_on(server).await
    }

    /// Serve using any transport server. Returns when `shutdown` is
    /// called; the listener is released on return.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        {
            let mut state = self.lifecycle.lock();
            match *state {
                Lifecycle::Draining | Lifecycle::Stopped => return Ok(()),
                _ => *state = Lifecycle::Listening,
            }
        }
        info!("relay accepting connections");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, addr)) => {
                        self.admit(Arc::new(sender), receiver, addr);
                    }
                    Err(e) => {
                        warn!("accept error: {}", e);
                    }
                },
            }
        }

        info!("relay stopped accepting connections");
        Ok(())
    }

    /// Register an accepted transport and start its connection task.
    fn admit(
        &self,
        sender: Arc<dyn TransportSender>,
        receiver: impl TransportReceiver + 'static,
        addr: SocketAddr,
    ) {
        // Registration happens under the lifecycle lock: shutdown takes
        // the same lock before snapshotting the registry for its drain,
        // so every admitted connection is visible to the drain, and an
        // accept that loses the race is refused here instead of leaking
        // past it.
        let registered = {
            let state = self.lifecycle.lock();
            if matches!(*state, Lifecycle::Draining | Lifecycle::Stopped) {
                debug!("refusing connection from {}: relay is shutting down", addr);
                None
            } else {
                Some(self.shared.registry.register(sender.clone()))
            }
        };

        let connection = match registered {
            Some(Ok(connection)) => connection,
            Some(Err(e)) => {
                // Fatal for this accept only; the server continues
                warn!("refusing connection from {}: {}", addr, e);
                tokio::spawn(async move {
                    let _ = sender.close().await;
                });
                return;
            }
            None => {
                tokio::spawn(async move {
                    let _ = sender.close().await;
                });
                return;
            }
        };

        info!("connection {} accepted from {}", connection.id, addr);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            // Welcome goes out before any client message is required
            let welcome = Message::Welcome(WelcomeMessage {
                connection_id: connection.id.clone(),
                server_identity: shared.config.server_identity.clone(),
                protocol_version: PROTOCOL_VERSION,
                timestamp: time::now(),
            });
            if let Err(e) = connection.send_message(&welcome).await {
                warn!("welcome to {} failed: {}", connection.id, e);
            }

            run_connection(shared, connection, receiver, addr).await;
        });
    }

    /// Drain all connections and stop.
    ///
    /// Idempotent: a second call while draining or stopped is a no-op.
    /// Runs deterministically whether triggered by a termination
    /// signal or an internal fault.
    pub async fn shutdown(&self) {
        {
            let mut state = self.lifecycle.lock();
            match *state {
                Lifecycle::Draining | Lifecycle::Stopped => return,
                _ => *state = Lifecycle::Draining,
            }
        }
        info!(
            "shutting down: draining {} connections",
            self.shared.registry.len()
        );

        // Stop the accept loop; the listener drops when serve_on returns
        let _ = self.shutdown_tx.send(true);

        let drain_timeout = self.shared.config.drain_timeout;
        for id in self.shared.registry.ids() {
            if let Some(connection) = self.shared.registry.remove(&id) {
                match tokio::time::timeout(drain_timeout, connection.close()).await {
                    Ok(_) => debug!("connection {} closed", id),
                    Err(_) => warn!(
                        "connection {} did not close within {:?}, discarding",
                        id, drain_timeout
                    ),
                }
            }
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        info!("relay stopped");
    }
}

/// Per-connection processing loop. Frames are handled sequentially,
/// preserving per-connection message order; removal on exit is the
/// single release point of the transport handle.
async fn run_connection(
    shared: Arc<Shared>,
    connection: Arc<Connection>,
    mut receiver: impl TransportReceiver,
    addr: SocketAddr,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Data(data) => {
                handle_frame(&shared, &connection, &data).await;
            }
            TransportEvent::Disconnected { reason } => {
                info!("connection {} ({}) closed: {:?}", connection.id, addr, reason);
                break;
            }
            TransportEvent::Error(e) => {
                warn!("connection {} ({}) transport error: {}", connection.id, addr, e);
                break;
            }
            TransportEvent::Connected => {}
        }
    }

    shared.registry.remove(&connection.id);
}

/// Decode one frame and dispatch it. Decode failures are replied to
/// the sender as `error`; the connection stays open.
async fn handle_frame(shared: &Arc<Shared>, connection: &Arc<Connection>, data: &[u8]) {
    match codec::decode(data) {
        Ok(message) => dispatch(shared, connection, message).await,
        Err(e) => {
            match &e {
                hostlink_core::Error::UnknownKind(kind) => {
                    warn!("connection {} sent unrecognized kind `{}`", connection.id, kind);
                }
                other => {
                    debug!("connection {} sent malformed frame: {}", connection.id, other);
                }
            }
            reply(connection, &Message::error(e.to_string())).await;
        }
    }
}

/// Dispatch by message kind. The match is exhaustive over the closed
/// message enum, so adding a kind is a compile-time-checked change.
async fn dispatch(shared: &Arc<Shared>, connection: &Arc<Connection>, message: Message) {
    match message {
        Message::Register(register) => {
            handle_register(shared, connection, register.client_id).await;
        }

        Message::Ping => {
            reply(
                connection,
                &Message::Pong(PongMessage {
                    timestamp: time::now(),
                }),
            )
            .await;
        }

        Message::Action(action) => {
            handle_action(shared, connection, action).await;
        }

        Message::ActionResult(result) => {
            handle_action_result(shared, connection, result).await;
        }

        Message::Pong(pong) => {
            debug!("pong from {} (peer time {})", connection.id, pong.timestamp);
        }

        Message::Error(error) => {
            warn!("peer {} reported error: {}", connection.id, error.message);
        }

        Message::Welcome(_) | Message::RegistrationSuccess(_) | Message::RegistrationFailed(_) => {
            warn!(
                "connection {} sent server-to-client kind `{}`",
                connection.id,
                message.kind()
            );
            reply(
                connection,
                &Message::error(format!(
                    "kind `{}` is server-to-client only",
                    message.kind()
                )),
            )
            .await;
        }
    }
}

async fn handle_register(shared: &Arc<Shared>, connection: &Arc<Connection>, client_id: String) {
    match shared.config.allowlist.capabilities(&client_id) {
        Some(capabilities) => {
            match shared.registry.mark_registered(&connection.id, &client_id) {
                Ok(()) => {
                    info!("connection {} registered as {}", connection.id, client_id);
                    reply(
                        connection,
                        &Message::RegistrationSuccess(RegistrationSuccessMessage {
                            client_id,
                            capabilities: capabilities.to_vec(),
                        }),
                    )
                    .await;
                }
                Err(e) => {
                    // Lost the race with a concurrent close; nothing to do
                    warn!("registration of {} raced with close: {}", client_id, e);
                }
            }
        }
        None => {
            info!(
                "connection {} rejected: identity `{}` not on the allow-list",
                connection.id, client_id
            );
            reply(
                connection,
                &Message::RegistrationFailed(RegistrationFailedMessage {
                    reason: format!("client identity `{}` is not on the allow-list", client_id),
                }),
            )
            .await;
        }
    }
}

async fn handle_action(
    shared: &Arc<Shared>,
    connection: &Arc<Connection>,
    action: hostlink_core::ActionMessage,
) {
    if shared.config.require_registration && !connection.is_registered() {
        reply(
            connection,
            &Message::error("registration required before domain actions"),
        )
        .await;
        return;
    }

    let Some(owner) = shared.config.allowlist.owner_of(&action.action) else {
        reply(
            connection,
            &Message::error(format!("no identity provides action `{}`", action.action)),
        )
        .await;
        return;
    };
    let owner = owner.to_string();

    let seq = shared
        .pending
        .insert(&action.token, connection.id.clone(), &action.action);
    spawn_request_timeout(shared.clone(), action.token.clone(), seq);

    // The relay carries transport and correlation integrity only; the
    // owning peer implements the action (and answers errors for
    // actions it does not handle)
    let delivered = shared
        .broadcaster
        .broadcast_to_identity(&owner, &Message::Action(action))
        .await;
    if delivered == 0 {
        debug!(
            "no open connections for identity {}; request will time out",
            owner
        );
    }
}

async fn handle_action_result(
    shared: &Arc<Shared>,
    connection: &Arc<Connection>,
    result: ActionResultMessage,
) {
    match shared.pending.complete(&result.token) {
        Some(entry) => {
            // Token is echoed back unchanged to the origin
            shared
                .broadcaster
                .send_to(&entry.origin, &Message::ActionResult(result))
                .await;
        }
        None => {
            warn!(
                "connection {} answered unknown or expired token {}",
                connection.id, result.token
            );
            reply(
                connection,
                &Message::error(format!(
                    "unknown or expired correlation token `{}`",
                    result.token
                )),
            )
            .await;
        }
    }
}

/// Arm the expiry for an in-flight request. On timeout the origin
/// receives a failed `action-result` carrying the original token.
fn spawn_request_timeout(shared: Arc<Shared>, token: String, seq: u64) {
    let timeout = shared.config.request_timeout;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(entry) = shared.pending.expire(&token, seq) {
            warn!(
                "action {} (token {}) timed out after {:?}",
                entry.action, token, timeout
            );
            let result = Message::ActionResult(ActionResultMessage {
                token,
                success: false,
                payload: None,
                reason: Some(format!("action `{}` timed out", entry.action)),
            });
            shared.broadcaster.send_to(&entry.origin, &result).await;
        }
    });
}

/// Reply to the originating connection; write failures are logged and
/// left to the connection task's own cleanup.
async fn reply(connection: &Arc<Connection>, message: &Message) {
    if let Err(e) = connection.send_message(message).await {
        warn!("reply {} to {} failed: {}", message.kind(), connection.id, e);
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
