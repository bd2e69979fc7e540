use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::protocol::frame::DEFAULT_MAX_RECORD_BYTES;
use voxlink_core::protocol::outgoing::{
    default_capabilities, default_scope, DEFAULT_CLIENT_NAME, DEFAULT_CLIENT_VERSION,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoxlinkConfig {
    pub version: u32,

    #[serde(default)]
    pub hub: HubSection,

    #[serde(default)]
    pub client: ClientSection,

    #[serde(default)]
    pub audio: AudioSection,
}

impl VoxlinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VoxlinkError::UnsupportedVersion);
        }

        self.hub.validate()?;
        self.client.validate()?;
        self.audio.validate()?;

        Ok(())
    }
}

fn invalid(msg: &str) -> VoxlinkError {
    VoxlinkError::InvalidConfig(msg.into())
}

fn check_path(path: &str, what: &str) -> Result<()> {
    if !path.starts_with('/') || path.contains('?') {
        return Err(VoxlinkError::InvalidConfig(format!(
            "{what} must be an absolute path without query"
        )));
    }
    Ok(())
}

/// Control channel endpoint and lifecycle timers.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubSection {
    /// Server base URL (`http`, `https`, `ws` or `wss`).
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_hub_path")]
    pub hub_path: String,

    #[serde(default = "default_negotiate_path")]
    pub negotiate_path: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound between socket open and `welcome`.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    /// Largest record the decoder buffers while waiting for a separator.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            hub_path: default_hub_path(),
            negotiate_path: default_negotiate_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

impl HubSection {
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| VoxlinkError::InvalidConfig(format!("hub.url is not a valid url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(invalid("hub.url scheme must be http, https, ws or wss"));
        }
        check_path(&self.hub_path, "hub.hub_path")?;
        check_path(&self.negotiate_path, "hub.negotiate_path")?;

        if !(100..=120_000).contains(&self.connect_timeout_ms) {
            return Err(invalid("hub.connect_timeout_ms must be between 100 and 120000"));
        }
        if !(100..=120_000).contains(&self.ready_timeout_ms) {
            return Err(invalid("hub.ready_timeout_ms must be between 100 and 120000"));
        }
        if !(1_000..=300_000).contains(&self.keepalive_interval_ms) {
            return Err(invalid(
                "hub.keepalive_interval_ms must be between 1000 and 300000",
            ));
        }
        if !(100..=60_000).contains(&self.close_timeout_ms) {
            return Err(invalid("hub.close_timeout_ms must be between 100 and 60000"));
        }
        if !(1024..=64 * 1024 * 1024).contains(&self.max_record_bytes) {
            return Err(invalid(
                "hub.max_record_bytes must be between 1024 and 67108864",
            ));
        }
        Ok(())
    }
}

fn default_url() -> String {
    "http://127.0.0.1:5384".into()
}
fn default_hub_path() -> String {
    "/hub".into()
}
fn default_negotiate_path() -> String {
    "/hub/negotiate".into()
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_ready_timeout_ms() -> u64 {
    15_000
}
fn default_keepalive_interval_ms() -> u64 {
    15_000
}
fn default_close_timeout_ms() -> u64 {
    5_000
}
fn default_max_record_bytes() -> usize {
    DEFAULT_MAX_RECORD_BYTES
}

/// Identity announced by `authenticate` and `registerApp`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    #[serde(default = "default_client_name")]
    pub name: String,

    #[serde(default = "default_client_version")]
    pub version: String,

    #[serde(default = "default_scope")]
    pub scope: Vec<String>,

    /// Replaces the default capability object when set.
    #[serde(default)]
    pub capabilities: Option<Value>,

    #[serde(default = "default_app_label")]
    pub app_label: String,

    #[serde(default = "default_auto_register_app")]
    pub auto_register_app: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            version: default_client_version(),
            scope: default_scope(),
            capabilities: None,
            app_label: default_app_label(),
            auto_register_app: default_auto_register_app(),
        }
    }
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("client.name must not be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("client.version must not be empty"));
        }
        if self.scope.is_empty() {
            return Err(invalid("client.scope must not be empty"));
        }
        if self.auto_register_app && self.app_label.trim().is_empty() {
            return Err(invalid(
                "client.app_label must not be empty when auto_register_app is set",
            ));
        }
        if let Some(caps) = &self.capabilities {
            if !caps.is_object() {
                return Err(invalid("client.capabilities must be a mapping"));
            }
        }
        Ok(())
    }

    /// Capabilities sent on `authenticate`.
    pub fn capabilities_or_default(&self) -> Value {
        self.capabilities.clone().unwrap_or_else(default_capabilities)
    }
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.into()
}
fn default_client_version() -> String {
    DEFAULT_CLIENT_VERSION.into()
}
fn default_app_label() -> String {
    "voxlink".into()
}
fn default_auto_register_app() -> bool {
    true
}

/// Audio sidecar channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioSection {
    #[serde(default = "default_audio_path")]
    pub path: String,

    /// Outgoing frames buffered before `send_audio` reports backpressure.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Informational; frames are passed through untouched.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            path: default_audio_path(),
            queue_capacity: default_queue_capacity(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl AudioSection {
    pub fn validate(&self) -> Result<()> {
        check_path(&self.path, "audio.path")?;
        if !(1..=1024).contains(&self.queue_capacity) {
            return Err(invalid("audio.queue_capacity must be between 1 and 1024"));
        }
        if !(8_000..=48_000).contains(&self.sample_rate) {
            return Err(invalid("audio.sample_rate must be between 8000 and 48000"));
        }
        Ok(())
    }
}

fn default_audio_path() -> String {
    "/hub/audio".into()
}
fn default_queue_capacity() -> usize {
    8
}
fn default_sample_rate() -> u32 {
    16_000
}
