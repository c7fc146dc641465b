//! Hostlink Relay
//!
//! The relay is the local hub between a plugin's panel process and the
//! editor host's scripting runtime:
//! - Tracks live connections and their registration state
//! - Routes typed messages by kind
//! - Fans out domain actions to the identity that owns them
//! - Threads correlation tokens through request/response pairs
//! - Drains connections on shutdown with bounded waits
//!
//! # Example
//!
//! ```no_run
//! use hostlink_relay::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relay = RelayServer::new(RelayConfig::default());
//!     relay.serve_websocket("127.0.0.1:7806").await?;
//!     Ok(())
//! }
//! ```

pub mod allowlist;
pub mod broadcast;
pub mod error;
pub mod pending;
pub mod registry;
pub mod relay;

pub use allowlist::Allowlist;
pub use broadcast::Broadcaster;
pub use error::{RegistryError, RelayError, Result};
pub use pending::{PendingRequest, PendingRequests};
pub use registry::{Connection, ConnectionId, ConnectionRegistry};
pub use relay::{Lifecycle, RelayConfig, RelayServer};
