//! Hostlink Transport
//!
//! Transport layer for the hostlink relay. The relay core is
//! transport-agnostic: it accepts connections from anything that
//! implements [`TransportServer`]. WebSocket is the only shipped
//! implementation, since the panel peer is a browser runtime.

pub mod error;
pub mod traits;
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer};
pub use websocket::{WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport};
