//! Capability broadcaster
//!
//! Unicast and identity fan-out over the registry. Delivery failures
//! here are expected races with concurrent close: they are logged per
//! recipient and never abort the remaining sends or escalate to the
//! caller.

use hostlink_core::{codec, Message};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Direct unicast. Returns whether the message was handed to the
    /// transport; a miss is logged and swallowed.
    pub async fn send_to(&self, connection_id: &str, message: &Message) -> bool {
        let Some(connection) = self.registry.get(connection_id) else {
            debug!(
                "dropping {} for {}: connection already removed",
                message.kind(),
                connection_id
            );
            return false;
        };

        if !connection.is_connected() {
            debug!(
                "dropping {} for {}: transport not writable",
                message.kind(),
                connection_id
            );
            return false;
        }

        match connection.send_message(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("send to {} failed: {}", connection_id, e);
                false
            }
        }
    }

    /// Fan out to every open connection registered under `identity`.
    /// Operates on a point-in-time snapshot; returns the number of
    /// successful deliveries. Zero recipients is a successful no-op.
    pub async fn broadcast_to_identity(&self, identity: &str, message: &Message) -> usize {
        let targets = self.registry.list_by_identity(identity);
        if targets.is_empty() {
            debug!(
                "broadcast of {} to identity {}: no open connections",
                message.kind(),
                identity
            );
            return 0;
        }

        // Encode once for the whole fan-out
        let data = match codec::encode(message) {
            Ok(data) => data,
            Err(e) => {
                warn!("broadcast encode failed: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for id in targets {
            let Some(connection) = self.registry.get(&id) else {
                continue;
            };
            if !connection.is_connected() {
                debug!("skipping {}: transport not writable", id);
                continue;
            }
            match connection.send(data.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("broadcast to {} failed: {}", id, e),
            }
        }

        debug!(
            "broadcast {} to identity {}: {} delivered",
            message.kind(),
            identity,
            delivered
        );
        delivered
    }
}
