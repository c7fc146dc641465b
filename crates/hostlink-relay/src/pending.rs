//! Pending correlation table
//!
//! Maps in-flight correlation tokens to the connection that issued the
//! request, so the matching `action-result` can be routed back.
//! Entries carry a sequence number: a token may be reused after its
//! request resolves, and an expiry for an old sequence must not evict
//! the newer entry.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

use crate::registry::ConnectionId;

/// One in-flight request
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub origin: ConnectionId,
    pub action: String,
    pub created_at: Instant,
    seq: u64,
}

/// Token-keyed table of in-flight requests
pub struct PendingRequests {
    entries: DashMap<String, PendingRequest>,
    next_seq: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Record an in-flight request. Returns the sequence number to
    /// pass to [`expire`](Self::expire).
    pub fn insert(&self, token: &str, origin: ConnectionId, action: &str) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let previous = self.entries.insert(
            token.to_string(),
            PendingRequest {
                origin,
                action: action.to_string(),
                created_at: Instant::now(),
                seq,
            },
        );
        if let Some(old) = previous {
            warn!(
                "correlation token {} reused while request for {} was still pending",
                token, old.action
            );
        }
        seq
    }

    /// Resolve a request by token. The common path when a matching
    /// `action-result` arrives.
    pub fn complete(&self, token: &str) -> Option<PendingRequest> {
        self.entries.remove(token).map(|(_, entry)| entry)
    }

    /// Remove an entry on timeout, but only if it is still the same
    /// request that armed the timer.
    pub fn expire(&self, token: &str, seq: u64) -> Option<PendingRequest> {
        self.entries
            .remove_if(token, |_, entry| entry.seq == seq)
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
