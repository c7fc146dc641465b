//! Connection registry
//!
//! Tracks every live transport connection and its registration state.
//! The registry entry is the exclusive owner of the transport sender;
//! removal is the single point where that handle is released.

use bytes::Bytes;
use dashmap::DashMap;
use hostlink_core::{codec, Message};
use hostlink_transport::{TransportError, TransportSender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::RegistryError;

/// Connection identifier, unique for the process lifetime
pub type ConnectionId = String;

/// One live transport session
pub struct Connection {
    /// Unique connection ID, assigned at accept time
    pub id: ConnectionId,
    /// Transport sender; writes through it are serialized by the
    /// transport's own write queue
    sender: Arc<dyn TransportSender>,
    /// Declared client identity, set only by a successful register
    identity: RwLock<Option<String>>,
    /// Accept time
    pub connected_at: Instant,
}

impl Connection {
    fn new(sender: Arc<dyn TransportSender>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            identity: RwLock::new(None),
            connected_at: Instant::now(),
        }
    }

    /// Send raw bytes to this connection
    pub async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        self.sender.send(data).await
    }

    /// Encode and send a protocol message
    pub async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        let data = codec::encode(message)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.send(data).await
    }

    /// Declared identity, if registered
    pub fn identity(&self) -> Option<String> {
        self.identity.read().clone()
    }

    /// Registration flag
    pub fn is_registered(&self) -> bool {
        self.identity.read().is_some()
    }

    /// Whether the transport is currently writable
    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    /// Close the transport
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sender.close().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &*self.identity.read())
            .finish()
    }
}

/// Process-wide map of connection id to connection, owned by the relay
/// server instance
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// 0 = unlimited
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
        }
    }

    /// Admit a new connection with default (unregistered) state
    pub fn register(
        &self,
        sender: Arc<dyn TransportSender>,
    ) -> Result<Arc<Connection>, RegistryError> {
        if self.max_connections > 0 && self.connections.len() >= self.max_connections {
            return Err(RegistryError::ResourceExhausted {
                limit: self.max_connections,
            });
        }

        let connection = Arc::new(Connection::new(sender));
        self.connections
            .insert(connection.id.clone(), connection.clone());
        debug!("connection {} admitted", connection.id);
        Ok(connection)
    }

    /// Record a successful registration.
    ///
    /// `UnknownConnection` means the connection closed concurrently;
    /// callers treat it as a no-op with a warning.
    pub fn mark_registered(&self, id: &str, identity: &str) -> Result<(), RegistryError> {
        let entry = self
            .connections
            .get(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.to_string()))?;
        *entry.identity.write() = Some(identity.to_string());
        Ok(())
    }

    /// Remove a connection. Idempotent; removing an absent id is a
    /// no-op. Returns the entry so shutdown can close it.
    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| {
            debug!("connection {} removed", id);
            conn
        })
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|e| e.value().clone())
    }

    /// Point-in-time snapshot of the ids registered under `identity`.
    /// Does not block concurrent mutation.
    pub fn list_by_identity(&self, identity: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| e.value().identity().as_deref() == Some(identity))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Snapshot of all connection ids
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
