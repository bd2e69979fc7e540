//! Session pinning.
//!
//! The engine keeps exactly one piece of conversation state: the most recent
//! session id announced by the server. It is written only by `chatStarted`
//! and `chatsSessionsUpdated` (last write wins) and read when an outgoing
//! message needs a session id the caller did not pass. Chat ids and
//! participants are never tracked.

use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::protocol::incoming::{EventRecord, ServerEventKind};

#[derive(Debug, Default)]
pub struct SessionPinner {
    session_id: RwLock<Option<String>>,
}

impl SessionPinner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Update the pin from an inbound event. Returns the new id if the event
    /// is one of the pinning events and carried a usable id.
    pub fn observe(&self, event: &EventRecord) -> Option<String> {
        let id = match event.kind()? {
            ServerEventKind::ChatStarted => session_id_of(&event.payload),
            ServerEventKind::ChatsSessionsUpdated => session_id_of(&event.payload).or_else(|| {
                event
                    .payload
                    .get("sessions")
                    .and_then(|s| s.get(0))
                    .and_then(session_id_of)
            }),
            _ => None,
        }?;

        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
        tracing::info!(event = %event.name, session_id = %id, "session pinned");
        Some(id)
    }

    /// Explicit id if given, else the pinned one.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<String> {
        match explicit {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => self.get().ok_or(VoxlinkError::MissingField("sessionId")),
        }
    }
}

fn session_id_of(v: &Value) -> Option<String> {
    v.get("sessionId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn last_write_wins_across_both_events() {
        let p = SessionPinner::new();
        p.observe(&EventRecord::new("chatStarted", json!({"sessionId": "S1"})));
        assert_eq!(p.get().as_deref(), Some("S1"));
        p.observe(&EventRecord::new(
            "chatsSessionsUpdated",
            json!({"sessions": [{"sessionId": "S2", "chatId": "C"}]}),
        ));
        assert_eq!(p.get().as_deref(), Some("S2"));
    }

    #[test]
    fn other_events_never_pin() {
        let p = SessionPinner::new();
        assert_eq!(p.observe(&EventRecord::new("message", json!({"sessionId": "X"}))), None);
        assert_eq!(p.observe(&EventRecord::new("chatStarted", json!({}))), None);
        assert_eq!(p.get(), None);
    }

    #[test]
    fn resolve_prefers_explicit() {
        let p = SessionPinner::new();
        assert!(matches!(
            p.resolve(None).unwrap_err(),
            VoxlinkError::MissingField("sessionId")
        ));
        p.observe(&EventRecord::new("chatStarted", json!({"sessionId": "S1"})));
        assert_eq!(p.resolve(Some("S9")).unwrap(), "S9");
        assert_eq!(p.resolve(Some("")).unwrap(), "S1");
        p.clear();
        assert!(p.resolve(None).is_err());
    }
}
