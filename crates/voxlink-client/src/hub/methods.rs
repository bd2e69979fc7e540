//! Outgoing hub methods.
//!
//! Each method builds one [`ClientMessage`] and hands it to
//! [`HubClient::send`]. Methods that address a session take an optional id
//! and fall back to the pinned one; with neither they fail with
//! `MissingField("sessionId")` before anything is written.

use serde_json::{Map, Value};
use uuid::Uuid;

use voxlink_core::error::Result;
use voxlink_core::protocol::outgoing::ClientMessage;

use crate::hub::client::HubClient;

/// Reply generation flags of `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendFlags {
    pub do_reply: bool,
    pub do_user_action_inference: bool,
    pub do_character_action_inference: bool,
}

impl Default for SendFlags {
    fn default() -> Self {
        Self {
            do_reply: true,
            do_user_action_inference: true,
            do_character_action_inference: true,
        }
    }
}

/// Arguments of `updateContext`; unset lists are left out of the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub context_key: String,
    pub contexts: Option<Vec<Value>>,
    pub actions: Option<Vec<Value>>,
    pub events: Option<Vec<Value>>,
    pub set_flags: Option<Vec<String>>,
    pub enable_roles: Option<Map<String, Value>>,
}

impl ContextUpdate {
    pub fn new(context_key: impl Into<String>) -> Self {
        Self {
            context_key: context_key.into(),
            ..Self::default()
        }
    }
}

impl HubClient {
    fn session(&self, explicit: Option<&str>) -> Result<String> {
        self.pinner().resolve(explicit)
    }

    /// Announce this client as an app. Sent automatically after `welcome`
    /// when `client.auto_register_app` is set.
    pub async fn register_app(&self) -> Result<String> {
        let c = &self.config().client;
        self.send(ClientMessage::RegisterApp {
            client_version: c.version.clone(),
            label: c.app_label.clone(),
        })
        .await
    }

    pub async fn subscribe_to_chat(&self, session_id: &str, chat_id: &str) -> Result<String> {
        self.send(ClientMessage::SubscribeToChat {
            session_id: session_id.into(),
            chat_id: chat_id.into(),
        })
        .await
    }

    pub async fn start_chat(&self, character_id: &str, contexts: Vec<Value>) -> Result<String> {
        self.send(ClientMessage::StartChat {
            character_id: character_id.into(),
            contexts,
        })
        .await
    }

    pub async fn resume_chat(&self, chat_id: &str) -> Result<String> {
        self.send(ClientMessage::ResumeChat {
            chat_id: chat_id.into(),
        })
        .await
    }

    pub async fn stop_chat(&self, chat_id: &str) -> Result<String> {
        self.send(ClientMessage::StopChat {
            chat_id: chat_id.into(),
        })
        .await
    }

    /// User message with reply generation and both inferences on.
    pub async fn send_message(&self, text: &str, session_id: Option<&str>) -> Result<String> {
        self.send_message_with(text, SendFlags::default(), session_id)
            .await
    }

    pub async fn send_message_with(
        &self,
        text: &str,
        flags: SendFlags,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::Send {
            session_id: self.session(session_id)?,
            text: text.into(),
            do_reply: flags.do_reply,
            do_user_action_inference: flags.do_user_action_inference,
            do_character_action_inference: flags.do_character_action_inference,
        })
        .await
    }

    /// Ask a character to speak, optionally with a fixed line.
    pub async fn character_speech_request(
        &self,
        character_id: &str,
        text: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::CharacterSpeechRequest {
            session_id: self.session(session_id)?,
            character_id: character_id.into(),
            text: text.map(str::to_string),
        })
        .await
    }

    pub async fn interrupt(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::Interrupt {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn pause(&self, pause: bool, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::Pause {
            session_id: self.session(session_id)?,
            pause,
        })
        .await
    }

    pub async fn inspect(&self, enabled: bool, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::Inspect {
            session_id: self.session(session_id)?,
            enabled,
        })
        .await
    }

    pub async fn inspect_audio_input(
        &self,
        enabled: bool,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::InspectAudioInput {
            session_id: self.session(session_id)?,
            enabled,
        })
        .await
    }

    pub async fn update_context(
        &self,
        update: ContextUpdate,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::UpdateContext {
            session_id: self.session(session_id)?,
            context_key: update.context_key,
            contexts: update.contexts,
            actions: update.actions,
            events: update.events,
            set_flags: update.set_flags,
            enable_roles: update.enable_roles,
        })
        .await
    }

    pub async fn update_message(
        &self,
        message_id: &str,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::UpdateMessage {
            session_id: self.session(session_id)?,
            message_id: message_id.into(),
            text: text.into(),
        })
        .await
    }

    pub async fn delete_message(&self, message_id: &str, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::DeleteMessage {
            session_id: self.session(session_id)?,
            message_id: message_id.into(),
        })
        .await
    }

    /// Trigger an app action. A fresh message id is generated when none is given.
    pub async fn trigger_action(
        &self,
        value: &str,
        arguments: Option<Map<String, Value>>,
        message_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<String> {
        let message_id = message_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.send(ClientMessage::TriggerAction {
            session_id: self.session(session_id)?,
            message_id,
            value: value.into(),
            arguments,
        })
        .await
    }

    pub async fn retry(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::Retry {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn revert(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::Revert {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn typing_start(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::TypingStart {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn typing_end(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::TypingEnd {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn request_suggestions(&self, session_id: Option<&str>) -> Result<String> {
        self.send(ClientMessage::RequestSuggestions {
            session_id: self.session(session_id)?,
        })
        .await
    }

    pub async fn add_chat_participant(
        &self,
        character_id: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::AddChatParticipant {
            session_id: self.session(session_id)?,
            character_id: character_id.into(),
        })
        .await
    }

    pub async fn remove_chat_participant(
        &self,
        character_id: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::RemoveChatParticipant {
            session_id: self.session(session_id)?,
            character_id: character_id.into(),
        })
        .await
    }

    /// Acknowledge that playback of a reply segment started.
    pub async fn speech_playback_start(
        &self,
        message_id: &str,
        start_index: u32,
        end_index: u32,
        duration: u32,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::SpeechPlaybackStart {
            session_id: self.session(session_id)?,
            message_id: message_id.into(),
            start_index,
            end_index,
            duration,
        })
        .await
    }

    pub async fn speech_playback_complete(
        &self,
        message_id: &str,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::SpeechPlaybackComplete {
            session_id: self.session(session_id)?,
            message_id: message_id.into(),
        })
        .await
    }

    pub async fn load_characters_list(&self) -> Result<String> {
        self.send(ClientMessage::LoadCharactersList).await
    }

    pub async fn load_scenarios_list(&self) -> Result<String> {
        self.send(ClientMessage::LoadScenariosList).await
    }

    pub async fn load_chats_list(
        &self,
        character_id: Option<&str>,
        scenario_id: Option<&str>,
    ) -> Result<String> {
        self.send(ClientMessage::LoadChatsList {
            character_id: character_id.map(str::to_string),
            scenario_id: scenario_id.map(str::to_string),
        })
        .await
    }
}
