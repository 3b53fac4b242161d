//! Signaling envelopes exchanged over the relay WebSocket.
//!
//! The relay is content-agnostic: it only looks at the routing fields of an
//! inbound JSON object and forwards the original text untouched.
//!
//! # Client → relay
//!
//! ```json
//! {"type":"register","userId":"u1"}
//! {"type":"offer","from":"u2","to":"u1","sdp":"..."}
//! ```
//!
//! # Relay → client
//!
//! ```json
//! {"type":"error","message":"Recipient not available","from":"server","to":"u2"}
//! ```
//!
//! plus verbatim copies of signals addressed to the client.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// `type` value that marks a registration envelope.
pub const REGISTER_TYPE: &str = "register";

/// Text of the routing-failure error envelope.
pub const RECIPIENT_NOT_AVAILABLE: &str = "Recipient not available";

/// `from` value used on envelopes generated by the relay itself.
pub const SERVER_SENDER: &str = "server";

// ── Connection identity ───────────────────────────────────────────────────────

/// Opaque handle for one accepted WebSocket connection.
///
/// Distinct from the client-chosen *identity* string: a connection exists
/// before it registers, and two connections may claim the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Why an inbound frame was dropped.
///
/// None of these are ever reported to the client; they only reach the logs.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope is neither a registration nor a routable signal")]
    Unrecognised,
}

/// The routing-relevant view of an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEnvelope {
    /// `{"type":"register","userId":<identity>}`
    Register { user_id: String },

    /// Any object carrying non-empty `type`, `from` and `to`.
    ///
    /// The remaining fields are not retained; the relay forwards the raw text.
    Signal {
        kind: String,
        from: String,
        to: String,
    },
}

impl InboundEnvelope {
    /// Classifies a raw text frame.
    ///
    /// Registration is checked first, so a `register` envelope that also
    /// happens to carry `from`/`to` still registers rather than routes.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvelopeError`] for any frame that must be dropped.
    ///
    /// # Example
    ///
    /// ```rust
    /// use advice_signal_relay::domain::InboundEnvelope;
    ///
    /// let env = InboundEnvelope::parse(r#"{"type":"register","userId":"u1"}"#).unwrap();
    /// assert_eq!(env, InboundEnvelope::Register { user_id: "u1".into() });
    /// ```
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;
        let obj = value.as_object().ok_or(EnvelopeError::NotAnObject)?;

        let kind = non_empty_str(obj, "type");

        if kind == Some(REGISTER_TYPE) {
            if let Some(user_id) = non_empty_str(obj, "userId") {
                return Ok(InboundEnvelope::Register {
                    user_id: user_id.to_string(),
                });
            }
        }

        match (kind, non_empty_str(obj, "from"), non_empty_str(obj, "to")) {
            (Some(kind), Some(from), Some(to)) => Ok(InboundEnvelope::Signal {
                kind: kind.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            }),
            _ => Err(EnvelopeError::Unrecognised),
        }
    }
}

fn non_empty_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Envelope generated by the relay itself.
///
/// Field order on the wire is `type`, `message`, `from`, `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'static str,
    from: &'static str,
    to: String,
}

impl ErrorEnvelope {
    /// Routing failure reply, addressed back to the original sender.
    pub fn recipient_not_available(sender: impl Into<String>) -> Self {
        Self {
            kind: "error",
            message: RECIPIENT_NOT_AVAILABLE,
            from: SERVER_SENDER,
            to: sender.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
