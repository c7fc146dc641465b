//! Protocol types and message definitions
//!
//! Every wire message is a JSON object with a `kind` tag. Kinds are
//! kebab-case, fields are camelCase (the panel peer is a JavaScript
//! runtime).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::Timestamp;

/// All message kinds the relay understands, in wire form.
///
/// Kept in sync with the [`Message`] variants; the codec uses this to
/// distinguish an unrecognized kind from a malformed body.
pub const KNOWN_KINDS: &[&str] = &[
    "welcome",
    "register",
    "registration-success",
    "registration-failed",
    "ping",
    "pong",
    "action",
    "action-result",
    "error",
];

/// Protocol message enum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// Sent by the server immediately after accept, before any client
    /// message is required.
    Welcome(WelcomeMessage),

    /// Client declares its identity.
    Register(RegisterMessage),

    RegistrationSuccess(RegistrationSuccessMessage),

    RegistrationFailed(RegistrationFailedMessage),

    /// Liveness probe; answered with `pong`.
    Ping,

    Pong(PongMessage),

    /// Domain request, relayed to the identity that owns the action.
    Action(ActionMessage),

    /// Domain response, relayed back to the requesting connection.
    ActionResult(ActionResultMessage),

    Error(ErrorMessage),
}

/// WELCOME - connection accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMessage {
    pub connection_id: String,
    pub server_identity: String,
    pub protocol_version: u8,
    pub timestamp: Timestamp,
}

/// REGISTER - identity declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMessage {
    pub client_id: String,
}

/// REGISTRATION-SUCCESS - identity accepted, capabilities granted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSuccessMessage {
    pub client_id: String,
    pub capabilities: Vec<String>,
}

/// REGISTRATION-FAILED - identity rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFailedMessage {
    pub reason: String,
}

/// PONG - liveness reply with server time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub timestamp: Timestamp,
}

/// ACTION - domain request
///
/// `token` is the caller-supplied correlation token. The relay treats
/// it as opaque and echoes it back unchanged in the matching
/// `action-result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    pub token: String,
}

/// ACTION-RESULT - domain response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResultMessage {
    pub token: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// ERROR - recoverable fault report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}

impl Message {
    /// Wire tag for this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Welcome(_) => "welcome",
            Message::Register(_) => "register",
            Message::RegistrationSuccess(_) => "registration-success",
            Message::RegistrationFailed(_) => "registration-failed",
            Message::Ping => "ping",
            Message::Pong(_) => "pong",
            Message::Action(_) => "action",
            Message::ActionResult(_) => "action-result",
            Message::Error(_) => "error",
        }
    }

    /// Convenience constructor for `error` replies
    pub fn error(message: impl Into<String>) -> Self {
        Message::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_kind_is_known() {
        let samples = [
            Message::Welcome(WelcomeMessage {
                connection_id: "c".into(),
                server_identity: "s".into(),
                protocol_version: 1,
                timestamp: 0,
            }),
            Message::Register(RegisterMessage {
                client_id: "x".into(),
            }),
            Message::RegistrationSuccess(RegistrationSuccessMessage {
                client_id: "x".into(),
                capabilities: vec![],
            }),
            Message::RegistrationFailed(RegistrationFailedMessage {
                reason: "r".into(),
            }),
            Message::Ping,
            Message::Pong(PongMessage { timestamp: 0 }),
            Message::Action(ActionMessage {
                action: "a".into(),
                payload: Value::Null,
                token: "t".into(),
            }),
            Message::ActionResult(ActionResultMessage {
                token: "t".into(),
                success: true,
                payload: None,
                reason: None,
            }),
            Message::error("e"),
        ];
        for msg in &samples {
            assert!(KNOWN_KINDS.contains(&msg.kind()), "{} missing", msg.kind());
        }
        assert_eq!(samples.len(), KNOWN_KINDS.len());
    }

    #[test]
    fn fields_are_camel_case_on_the_wire() {
        let msg = Message::Welcome(WelcomeMessage {
            connection_id: "abc".into(),
            server_identity: "relay".into(),
            protocol_version: 1,
            timestamp: 42,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "welcome");
        assert_eq!(json["connectionId"], "abc");
        assert_eq!(json["serverIdentity"], "relay");
        assert_eq!(json["protocolVersion"], 1);
    }

    #[test]
    fn ping_is_a_bare_tag() {
        let json = serde_json::to_value(&Message::Ping).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "ping" }));
    }
}
