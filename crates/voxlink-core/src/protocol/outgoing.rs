//! Typed client messages.
//!
//! Every variant maps to one `$type` discriminator and is sent as the single
//! argument of a `SendMessage` invocation. Optional fields are omitted when
//! unset: the server matches payloads structurally and rejects `null`s.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{Result, VoxlinkError};
use crate::protocol::envelope::Envelope;

/// Hub method used for every outgoing message.
pub const SEND_MESSAGE_TARGET: &str = "SendMessage";

/// Default client identity announced by `authenticate`.
pub const DEFAULT_CLIENT_NAME: &str = "Voxta.Client.Web";
pub const DEFAULT_CLIENT_VERSION: &str = "1.2.1";

/// Roles requested by default on `authenticate`.
pub fn default_scope() -> Vec<String> {
    ["role:app", "role:admin", "role:inspector", "role:user"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Capabilities announced by default on `authenticate`.
pub fn default_capabilities() -> Value {
    json!({
        "audioInput": "WebSocketStream",
        "audioOutput": "Url",
        "acceptedAudioContentTypes": [
            "audio/x-wav", "audio/wav", "audio/mpeg", "audio/webm", "audio/pcm", "audio/ogg"
        ],
        "visionCapture": "PostImage",
        "visionSources": ["Screen", "Eyes", "Attachment"]
    })
}

/// Messages sent from the client to the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "$type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Authenticate {
        client: String,
        client_version: String,
        scope: Vec<String>,
        capabilities: Value,
    },
    #[serde(rename_all = "camelCase")]
    RegisterApp { client_version: String, label: String },
    #[serde(rename_all = "camelCase")]
    SubscribeToChat { session_id: String, chat_id: String },
    #[serde(rename_all = "camelCase")]
    StartChat {
        character_id: String,
        contexts: Vec<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ResumeChat { chat_id: String },
    #[serde(rename_all = "camelCase")]
    StopChat { chat_id: String },
    /// A user message. The three flags control reply generation and action inference.
    #[serde(rename_all = "camelCase")]
    Send {
        session_id: String,
        text: String,
        do_reply: bool,
        do_user_action_inference: bool,
        do_character_action_inference: bool,
    },
    #[serde(rename_all = "camelCase")]
    CharacterSpeechRequest {
        session_id: String,
        character_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Interrupt { session_id: String },
    #[serde(rename_all = "camelCase")]
    Pause { session_id: String, pause: bool },
    #[serde(rename_all = "camelCase")]
    Inspect { session_id: String, enabled: bool },
    #[serde(rename_all = "camelCase")]
    InspectAudioInput { session_id: String, enabled: bool },
    #[serde(rename_all = "camelCase")]
    UpdateContext {
        session_id: String,
        context_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        contexts: Option<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        actions: Option<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        events: Option<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        set_flags: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        enable_roles: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateMessage {
        session_id: String,
        message_id: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage {
        session_id: String,
        message_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TriggerAction {
        session_id: String,
        message_id: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<Map<String, Value>>,
    },
    #[serde(rename_all = "camelCase")]
    Retry { session_id: String },
    #[serde(rename_all = "camelCase")]
    Revert { session_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart { session_id: String },
    #[serde(rename_all = "camelCase")]
    TypingEnd { session_id: String },
    #[serde(rename_all = "camelCase")]
    RequestSuggestions { session_id: String },
    #[serde(rename_all = "camelCase")]
    AddChatParticipant {
        session_id: String,
        character_id: String,
    },
    #[serde(rename_all = "camelCase")]
    RemoveChatParticipant {
        session_id: String,
        character_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SpeechPlaybackStart {
        session_id: String,
        message_id: String,
        start_index: u32,
        end_index: u32,
        duration: u32,
    },
    #[serde(rename_all = "camelCase")]
    SpeechPlaybackComplete {
        session_id: String,
        message_id: String,
    },
    LoadCharactersList,
    LoadScenariosList,
    #[serde(rename_all = "camelCase")]
    LoadChatsList {
        #[serde(skip_serializing_if = "Option::is_none")]
        character_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        scenario_id: Option<String>,
    },
}

impl ClientMessage {
    /// `authenticate` with the default identity, scope and capabilities.
    pub fn authenticate_default() -> Self {
        ClientMessage::Authenticate {
            client: DEFAULT_CLIENT_NAME.into(),
            client_version: DEFAULT_CLIENT_VERSION.into(),
            scope: default_scope(),
            capabilities: default_capabilities(),
        }
    }

    /// `send` with all three inference flags on.
    pub fn send_text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        ClientMessage::Send {
            session_id: session_id.into(),
            text: text.into(),
            do_reply: true,
            do_user_action_inference: true,
            do_character_action_inference: true,
        }
    }

    /// Wire discriminator (`$type`).
    pub fn wire_type(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "authenticate",
            ClientMessage::RegisterApp { .. } => "registerApp",
            ClientMessage::SubscribeToChat { .. } => "subscribeToChat",
            ClientMessage::StartChat { .. } => "startChat",
            ClientMessage::ResumeChat { .. } => "resumeChat",
            ClientMessage::StopChat { .. } => "stopChat",
            ClientMessage::Send { .. } => "send",
            ClientMessage::CharacterSpeechRequest { .. } => "characterSpeechRequest",
            ClientMessage::Interrupt { .. } => "interrupt",
            ClientMessage::Pause { .. } => "pause",
            ClientMessage::Inspect { .. } => "inspect",
            ClientMessage::InspectAudioInput { .. } => "inspectAudioInput",
            ClientMessage::UpdateContext { .. } => "updateContext",
            ClientMessage::UpdateMessage { .. } => "updateMessage",
            ClientMessage::DeleteMessage { .. } => "deleteMessage",
            ClientMessage::TriggerAction { .. } => "triggerAction",
            ClientMessage::Retry { .. } => "retry",
            ClientMessage::Revert { .. } => "revert",
            ClientMessage::TypingStart { .. } => "typingStart",
            ClientMessage::TypingEnd { .. } => "typingEnd",
            ClientMessage::RequestSuggestions { .. } => "requestSuggestions",
            ClientMessage::AddChatParticipant { .. } => "addChatParticipant",
            ClientMessage::RemoveChatParticipant { .. } => "removeChatParticipant",
            ClientMessage::SpeechPlaybackStart { .. } => "speechPlaybackStart",
            ClientMessage::SpeechPlaybackComplete { .. } => "speechPlaybackComplete",
            ClientMessage::LoadCharactersList => "loadCharactersList",
            ClientMessage::LoadScenariosList => "loadScenariosList",
            ClientMessage::LoadChatsList { .. } => "loadChatsList",
        }
    }

    /// Required string fields, by wire name.
    fn required_fields(&self) -> Vec<(&'static str, &String)> {
        use ClientMessage as M;
        match self {
            M::Authenticate {
                client,
                client_version,
                ..
            } => vec![("client", client), ("clientVersion", client_version)],
            M::RegisterApp {
                client_version,
                label,
            } => vec![("clientVersion", client_version), ("label", label)],
            M::SubscribeToChat {
                session_id,
                chat_id,
            } => vec![("sessionId", session_id), ("chatId", chat_id)],
            M::StartChat { character_id, .. } => vec![("characterId", character_id)],
            M::ResumeChat { chat_id } | M::StopChat { chat_id } => vec![("chatId", chat_id)],
            M::Send {
                session_id, text, ..
            } => vec![("sessionId", session_id), ("text", text)],
            M::CharacterSpeechRequest {
                session_id,
                character_id,
                ..
            }
            | M::AddChatParticipant {
                session_id,
                character_id,
            }
            | M::RemoveChatParticipant {
                session_id,
                character_id,
            } => vec![("sessionId", session_id), ("characterId", character_id)],
            M::Interrupt { session_id }
            | M::Pause { session_id, .. }
            | M::Inspect { session_id, .. }
            | M::InspectAudioInput { session_id, .. }
            | M::Retry { session_id }
            | M::Revert { session_id }
            | M::TypingStart { session_id }
            | M::TypingEnd { session_id }
            | M::RequestSuggestions { session_id } => vec![("sessionId", session_id)],
            M::UpdateContext {
                session_id,
                context_key,
                ..
            } => vec![("sessionId", session_id), ("contextKey", context_key)],
            M::UpdateMessage {
                session_id,
                message_id,
                text,
            } => vec![
                ("sessionId", session_id),
                ("messageId", message_id),
                ("text", text),
            ],
            M::DeleteMessage {
                session_id,
                message_id,
            }
            | M::SpeechPlaybackStart {
                session_id,
                message_id,
                ..
            }
            | M::SpeechPlaybackComplete {
                session_id,
                message_id,
            } => vec![("sessionId", session_id), ("messageId", message_id)],
            M::TriggerAction {
                session_id,
                message_id,
                value,
                ..
            } => vec![
                ("sessionId", session_id),
                ("messageId", message_id),
                ("value", value),
            ],
            M::LoadCharactersList | M::LoadScenariosList | M::LoadChatsList { .. } => vec![],
        }
    }

    /// Fail with `MissingField` if any required field is the empty string.
    /// Whitespace-only values are sent as given.
    pub fn validate(&self) -> Result<()> {
        if let ClientMessage::Authenticate { scope, .. } = self {
            if scope.is_empty() {
                return Err(VoxlinkError::MissingField("scope"));
            }
        }
        match self
            .required_fields()
            .into_iter()
            .find(|(_, value)| value.is_empty())
        {
            Some((name, _)) => Err(VoxlinkError::MissingField(name)),
            None => Ok(()),
        }
    }

    /// Discriminated payload object (the single invocation argument).
    pub fn to_payload(&self) -> Result<Value> {
        self.validate()?;
        serde_json::to_value(self)
            .map_err(|e| VoxlinkError::Internal(format!("payload serialization failed: {e}")))
    }

    /// Wrap into a `SendMessage` invocation envelope.
    pub fn to_envelope(&self, invocation_id: impl Into<String>) -> Result<Envelope> {
        Ok(Envelope::invocation(
            invocation_id,
            SEND_MESSAGE_TARGET,
            vec![self.to_payload()?],
        ))
    }
}
