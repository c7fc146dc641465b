//! Hostlink Core
//!
//! Core types and encoding for the hostlink relay protocol, the local
//! bridge between a plugin's web-rendered panel and the editor host's
//! scripting runtime.
//!
//! This crate provides:
//! - Protocol message types ([`Message`])
//! - JSON wire encoding/decoding ([`codec`])
//! - Error taxonomy ([`Error`])
//! - Timing utilities ([`Timestamp`])

pub mod codec;
pub mod error;
pub mod time;
pub mod types;

pub use codec::{decode, encode};
pub use error::{Error, Result};
pub use time::Timestamp;
pub use types::*;

/// Protocol version advertised in `welcome`
pub const PROTOCOL_VERSION: u8 = 1;

/// Default WebSocket listen port
pub const DEFAULT_WS_PORT: u16 = 7806;

/// WebSocket subprotocol identifier
pub const WS_SUBPROTOCOL: &str = "hostlink.v1";
