use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Streaming callback invoked with each content delta.
pub type ChunkHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Role carried by a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Open metadata map attached to every assistant turn. Well-known fields are
/// typed; anything else round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// One conversation turn. A returned message always carries a non-empty id
/// and a role; content is empty only when a stream was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    /// Files the user sent with this turn, kept so saved sessions replay
    /// with their attachments intact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileAttachment>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: timestamp_id("message"),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::User, content);
        message.id = timestamp_id("user");
        message
    }

    pub fn assistant(content: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self {
            id: timestamp_id("assistant"),
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
            attachments: Vec::new(),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<FileAttachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Millisecond-timestamp id with a descriptive suffix, e.g. `1712345678901-aborted`.
pub fn timestamp_id(suffix: &str) -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Raw file attachment supplied by the caller, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(with = "serde_bytes_base64")]
    pub bytes: Vec<u8>,
}

impl FileAttachment {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }
}

/// Attachment content class after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Text,
    Image,
    Binary,
}

/// Attachment in the richer form consumed by the model selector and the
/// executors: extracted text for text files, base64 payload for images.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedAttachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub text: Option<String>,
    pub base64: Option<String>,
    pub size: usize,
}

impl ProcessedAttachment {
    pub fn is_image(&self) -> bool {
        self.kind == AttachmentKind::Image
    }
}

/// Model slots a request may pin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSlots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<String>,
}

/// Sampling parameters forwarded to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl Default for ChatParameters {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            top_p: None,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

/// Autonomous-agent settings. Absent settings mean "enabled".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_steps: default_max_steps(),
        }
    }
}

fn default_agent_enabled() -> bool {
    true
}

fn default_max_steps() -> u32 {
    10
}

/// Feature switches read by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    #[serde(default = "default_enable_tools")]
    pub enable_tools: bool,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            enable_tools: default_enable_tools(),
        }
    }
}

fn default_enable_tools() -> bool {
    true
}

/// Per-request assistant configuration. The orchestrator only ever reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default)]
    pub models: ModelSlots,
    #[serde(default)]
    pub parameters: ChatParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autonomous_agent: Option<AgentSettings>,
    #[serde(default)]
    pub features: FeatureSettings,
}

impl AiConfig {
    /// Autonomous mode is the default; only an explicit `enabled: false`
    /// opts a request out.
    pub fn autonomous_enabled(&self) -> bool {
        self.autonomous_agent
            .as_ref()
            .map(|agent| agent.enabled)
            .unwrap_or(true)
    }

    pub fn max_agent_steps(&self) -> u32 {
        self.autonomous_agent
            .as_ref()
            .map(|agent| agent.max_steps)
            .unwrap_or_else(default_max_steps)
    }
}

/// One chat request as handed to the orchestrator. Immutable for the
/// duration of the orchestration call that consumes it.
#[derive(Clone)]
pub struct ChatRequest {
    pub message: String,
    pub config: AiConfig,
    pub attachments: Vec<FileAttachment>,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub on_chunk: Option<ChunkHandler>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, config: AiConfig) -> Self {
        Self {
            message: message.into(),
            config,
            attachments: Vec::new(),
            system_prompt: None,
            history: Vec::new(),
            on_chunk: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<FileAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_chunk_handler(mut self, handler: ChunkHandler) -> Self {
        self.on_chunk = Some(handler);
        self
    }
}

/// Attachment bytes travel through session files as base64 text.
mod serde_bytes_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
