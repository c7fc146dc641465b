//! Timing utilities
//!
//! Wire timestamps are Unix milliseconds, matching what the
//! JavaScript panel peer produces with `Date.now()`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp type (milliseconds)
pub type Timestamp = u64;

/// Get current Unix timestamp in milliseconds
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as Timestamp
}
