//! Hub envelope and handshake records.
//!
//! Outgoing envelopes are built fresh per call; inbound envelopes are parsed
//! read-only. Unknown inbound fields (`headers`, `streamIds`, ...) are ignored
//! since the server may add them at any time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoxlinkError};
use crate::protocol::frame;

/// Hub message type (`type` field on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum MessageKind {
    Invocation,
    Completion,
    Ping,
    Close,
    /// Stream items, cancellations and anything newer. Surfaced as `unknown`.
    Other(u64),
}

impl From<u64> for MessageKind {
    fn from(v: u64) -> Self {
        match v {
            1 => MessageKind::Invocation,
            3 => MessageKind::Completion,
            6 => MessageKind::Ping,
            7 => MessageKind::Close,
            other => MessageKind::Other(other),
        }
    }
}

impl From<MessageKind> for u64 {
    fn from(k: MessageKind) -> Self {
        match k {
            MessageKind::Invocation => 1,
            MessageKind::Completion => 3,
            MessageKind::Ping => 6,
            MessageKind::Close => 7,
            MessageKind::Other(v) => v,
        }
    }
}

/// One hub protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Hub method name. Present exactly for invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Value>,
    /// Completion result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Completion or close error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Close hint from the server; the engine never reconnects on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reconnect: Option<bool>,
}

impl Envelope {
    fn bare(kind: MessageKind) -> Self {
        Self {
            kind,
            invocation_id: None,
            target: None,
            arguments: Vec::new(),
            result: None,
            error: None,
            allow_reconnect: None,
        }
    }

    pub fn invocation(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            target: Some(target.into()),
            arguments,
            ..Self::bare(MessageKind::Invocation)
        }
    }

    pub fn completion(
        invocation_id: impl Into<String>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Self {
        Self {
            invocation_id: Some(invocation_id.into()),
            result,
            error,
            ..Self::bare(MessageKind::Completion)
        }
    }

    pub fn ping() -> Self {
        Self::bare(MessageKind::Ping)
    }

    pub fn close(error: Option<String>) -> Self {
        Self {
            error,
            ..Self::bare(MessageKind::Close)
        }
    }

    /// Enforce the target invariant: non-empty for invocations, absent otherwise.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, self.target.as_deref()) {
            (MessageKind::Invocation, Some(t)) if !t.is_empty() => Ok(()),
            (MessageKind::Invocation, _) => Err(VoxlinkError::MalformedFrame(
                "invocation without target".into(),
            )),
            (_, None) => Ok(()),
            (_, Some(_)) => Err(VoxlinkError::MalformedFrame(
                "target is only valid on invocations".into(),
            )),
        }
    }

    /// First argument, which carries the discriminated payload.
    pub fn payload(&self) -> Option<&Value> {
        self.arguments.first()
    }

    /// Encode as a text frame.
    pub fn to_text(&self) -> Result<String> {
        self.validate()?;
        frame::encode_text(self)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let env: Envelope = serde_json::from_value(value)
            .map_err(|e| VoxlinkError::MalformedFrame(format!("invalid envelope: {e}")))?;
        env.validate()?;
        Ok(env)
    }
}

/// First record a client sends after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl Default for HandshakeRequest {
    fn default() -> Self {
        Self {
            protocol: "json".into(),
            version: 1,
        }
    }
}

/// Server answer to the handshake: `{}` on success, `{"error": ...}` otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default)]
    pub error: Option<String>,
}

impl HandshakeResponse {
    /// Handshake responses are the only records without a `type` field.
    pub fn matches(value: &Value) -> bool {
        value.is_object() && value.get("type").is_none()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| VoxlinkError::MalformedFrame(format!("invalid handshake response: {e}")))
    }
}
