//! JSON wire codec
//!
//! Decoding is two-stage so the relay can tell an unrecognized kind
//! apart from a malformed body: first the frame must parse as a JSON
//! object carrying a string `kind`, then the kind must be one we know,
//! then the body must deserialize.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::types::{Message, KNOWN_KINDS};

/// Encode a message to its JSON wire form
pub fn encode(msg: &Message) -> Result<Bytes> {
    let data = serde_json::to_vec(msg).map_err(|e| Error::EncodeError(e.to_string()))?;
    Ok(Bytes::from(data))
}

/// Decode a wire frame into a message
pub fn decode(data: &[u8]) -> Result<Message> {
    let value: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| Error::MalformedMessage(e.to_string()))?;

    if !value.is_object() {
        return Err(Error::MalformedMessage(
            "frame is not a JSON object".to_string(),
        ));
    }

    let kind = value
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| Error::MalformedMessage("missing `kind` field".to_string()))?;

    if !KNOWN_KINDS.contains(&kind) {
        return Err(Error::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| Error::MalformedMessage(e.to_string()))
}
