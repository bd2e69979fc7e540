//! Inbound record classification.
//!
//! Server events arrive as `ReceiveMessage` invocations whose first argument
//! carries a `$type` discriminator. Everything the engine does not recognise
//! is surfaced as an `unknown` event with the raw payload instead of being
//! dropped.

use serde_json::{json, Value};

use crate::error::Result;
use crate::protocol::envelope::{Envelope, HandshakeResponse, MessageKind};

/// Hub method the server invokes for every server event.
pub const RECEIVE_MESSAGE_TARGET: &str = "ReceiveMessage";

/// Engine-synthesized event names.
pub const READY_EVENT: &str = "ready";
pub const CLOSE_EVENT: &str = "close";
pub const CLIENT_SEND_EVENT: &str = "client_send";
pub const CALLBACK_ERROR_EVENT: &str = "callback_error";
pub const UNKNOWN_EVENT: &str = "unknown";
pub const COMPLETION_EVENT: &str = "completion";

/// Server event discriminators the engine recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    Welcome,
    ChatStarted,
    ChatsSessionsUpdated,
    ChatClosed,
    ChatFlow,
    ChatParticipantsUpdated,
    ContextUpdated,
    Message,
    Update,
    ReplyStart,
    ReplyGenerating,
    ReplyChunk,
    ReplyEnd,
    ReplyCancelled,
    Action,
    AppTrigger,
    InterruptSpeech,
    SpeechPlaybackStart,
    SpeechPlaybackComplete,
    SpeechRecognitionStart,
    SpeechRecognitionPartial,
    SpeechRecognitionEnd,
    CharactersListLoaded,
    ScenariosListLoaded,
    ChatsListLoaded,
    Suggestions,
    RecordingRequest,
    RecordingStatus,
    Error,
}

impl ServerEventKind {
    pub const ALL: [ServerEventKind; 29] = [
        ServerEventKind::Welcome,
        ServerEventKind::ChatStarted,
        ServerEventKind::ChatsSessionsUpdated,
        ServerEventKind::ChatClosed,
        ServerEventKind::ChatFlow,
        ServerEventKind::ChatParticipantsUpdated,
        ServerEventKind::ContextUpdated,
        ServerEventKind::Message,
        ServerEventKind::Update,
        ServerEventKind::ReplyStart,
        ServerEventKind::ReplyGenerating,
        ServerEventKind::ReplyChunk,
        ServerEventKind::ReplyEnd,
        ServerEventKind::ReplyCancelled,
        ServerEventKind::Action,
        ServerEventKind::AppTrigger,
        ServerEventKind::InterruptSpeech,
        ServerEventKind::SpeechPlaybackStart,
        ServerEventKind::SpeechPlaybackComplete,
        ServerEventKind::SpeechRecognitionStart,
        ServerEventKind::SpeechRecognitionPartial,
        ServerEventKind::SpeechRecognitionEnd,
        ServerEventKind::CharactersListLoaded,
        ServerEventKind::ScenariosListLoaded,
        ServerEventKind::ChatsListLoaded,
        ServerEventKind::Suggestions,
        ServerEventKind::RecordingRequest,
        ServerEventKind::RecordingStatus,
        ServerEventKind::Error,
    ];

    /// Event name (identical to the wire `$type`).
    pub fn as_str(self) -> &'static str {
        match self {
            ServerEventKind::Welcome => "welcome",
            ServerEventKind::ChatStarted => "chatStarted",
            ServerEventKind::ChatsSessionsUpdated => "chatsSessionsUpdated",
            ServerEventKind::ChatClosed => "chatClosed",
            ServerEventKind::ChatFlow => "chatFlow",
            ServerEventKind::ChatParticipantsUpdated => "chatParticipantsUpdated",
            ServerEventKind::ContextUpdated => "contextUpdated",
            ServerEventKind::Message => "message",
            ServerEventKind::Update => "update",
            ServerEventKind::ReplyStart => "replyStart",
            ServerEventKind::ReplyGenerating => "replyGenerating",
            ServerEventKind::ReplyChunk => "replyChunk",
            ServerEventKind::ReplyEnd => "replyEnd",
            ServerEventKind::ReplyCancelled => "replyCancelled",
            ServerEventKind::Action => "action",
            ServerEventKind::AppTrigger => "appTrigger",
            ServerEventKind::InterruptSpeech => "interruptSpeech",
            ServerEventKind::SpeechPlaybackStart => "speechPlaybackStart",
            ServerEventKind::SpeechPlaybackComplete => "speechPlaybackComplete",
            ServerEventKind::SpeechRecognitionStart => "speechRecognitionStart",
            ServerEventKind::SpeechRecognitionPartial => "speechRecognitionPartial",
            ServerEventKind::SpeechRecognitionEnd => "speechRecognitionEnd",
            ServerEventKind::CharactersListLoaded => "charactersListLoaded",
            ServerEventKind::ScenariosListLoaded => "scenariosListLoaded",
            ServerEventKind::ChatsListLoaded => "chatsListLoaded",
            ServerEventKind::Suggestions => "suggestions",
            ServerEventKind::RecordingRequest => "recordingRequest",
            ServerEventKind::RecordingStatus => "recordingStatus",
            ServerEventKind::Error => "error",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// One event delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub name: String,
    pub payload: Value,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Known server event kind, if the name is one.
    pub fn kind(&self) -> Option<ServerEventKind> {
        ServerEventKind::from_wire(&self.name)
    }

    /// String field of the payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Result of classifying one inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Answer to the client handshake.
    Handshake(HandshakeResponse),
    /// Keepalive from the server.
    Ping,
    /// Server is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// An event for the dispatcher.
    Event(EventRecord),
}

/// Where the connection is relative to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Handshake sent, response not seen yet.
    Handshake,
    /// Handshake answered; every record must carry a `type`.
    Established,
}

/// Classify one decoded record into exactly one [`Inbound`] outcome.
///
/// A typeless record is the handshake response only while `phase` is
/// [`Phase::Handshake`]; afterwards it is an `unknown` event.
pub fn classify(raw: Value, phase: Phase) -> Result<Inbound> {
    if HandshakeResponse::matches(&raw) {
        return match phase {
            Phase::Handshake => Ok(Inbound::Handshake(HandshakeResponse::from_value(raw)?)),
            Phase::Established => Ok(Inbound::Event(EventRecord::new(UNKNOWN_EVENT, raw))),
        };
    }

    let env = Envelope::from_value(raw.clone())?;
    let inbound = match env.kind {
        MessageKind::Ping => Inbound::Ping,
        MessageKind::Close => Inbound::Close {
            error: env.error,
            allow_reconnect: env.allow_reconnect.unwrap_or(false),
        },
        MessageKind::Completion => Inbound::Event(completion_event(env)),
        MessageKind::Invocation if env.target.as_deref() == Some(RECEIVE_MESSAGE_TARGET) => {
            Inbound::Event(server_event(env, raw))
        }
        MessageKind::Invocation | MessageKind::Other(_) => {
            Inbound::Event(EventRecord::new(UNKNOWN_EVENT, raw))
        }
    };
    Ok(inbound)
}

fn completion_event(env: Envelope) -> EventRecord {
    match env.error {
        Some(error) => EventRecord::new(
            ServerEventKind::Error.as_str(),
            json!({
                "$type": "completion",
                "invocationId": env.invocation_id,
                "error": error,
            }),
        ),
        None => EventRecord::new(
            COMPLETION_EVENT,
            json!({
                "$type": "completion",
                "invocationId": env.invocation_id,
                "result": env.result,
            }),
        ),
    }
}

fn server_event(env: Envelope, raw: Value) -> EventRecord {
    let Some(mut payload) = env.arguments.into_iter().next() else {
        return EventRecord::new(UNKNOWN_EVENT, raw);
    };

    let kind = payload
        .get("$type")
        .and_then(Value::as_str)
        .and_then(ServerEventKind::from_wire);

    match kind {
        Some(kind) => {
            if let (Some(obj), Some(id)) = (payload.as_object_mut(), env.invocation_id) {
                obj.entry("invocationId").or_insert(Value::String(id));
            }
            EventRecord::new(kind.as_str(), payload)
        }
        None => EventRecord::new(UNKNOWN_EVENT, payload),
    }
}
