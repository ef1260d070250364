use crate::core::error::AssistantError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod factory;
pub mod http;
pub mod registry;

pub use factory::ClientFactory;
pub use registry::ProviderRegistry;

/// Wire-level role, as sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Wire-level message, as sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Kind of backend endpoint a provider entry points at. Every kind speaks an
/// OpenAI-style chat-completions dialect; the kind picks default endpoints
/// and capability defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Ollama,
    Custom,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "openrouter" => Some(ProviderKind::OpenRouter),
            "ollama" => Some(ProviderKind::Ollama),
            "custom" => Some(ProviderKind::Custom),
            _ => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::Custom => "http://localhost:8080/v1",
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Custom
    }
}

/// One configured backend endpoint. Exactly one provider is current at a
/// time; making another one current reconfigures the active network client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Additional headers sent with every request, e.g. OpenRouter
    /// attribution headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub enabled: bool,
}

impl Provider {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            base_url: kind.default_base_url().to_string(),
            api_key: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Providers served from this machine. Model preloading only applies to
    /// these.
    pub fn is_local(&self) -> bool {
        if self.kind == ProviderKind::Ollama {
            return true;
        }
        base_url_is_loopback(&self.base_url)
    }
}

pub(crate) fn base_url_is_loopback(base_url: &str) -> bool {
    let stripped = base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    let host = stripped
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    matches!(host.as_str(), "localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]")
}

/// One model a provider serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

/// Content deltas produced by a streaming chat call.
pub type ContentStream = BoxStream<'static, Result<String, AssistantError>>;

/// Wire-level chat request handed to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl ClientChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<WireMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }
}

/// Network client bound to one provider endpoint. Stream cancellation is
/// part of the contract rather than probed at runtime; backends without
/// anything to cancel inherit the no-op.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Id of the provider this client is bound to.
    fn provider_id(&self) -> &str;

    /// Single request/response exchange.
    async fn chat(&self, request: &ClientChatRequest) -> Result<String, AssistantError>;

    /// Streaming exchange yielding content deltas.
    async fn chat_stream(
        &self,
        request: &ClientChatRequest,
    ) -> Result<ContentStream, AssistantError>;

    /// Models the backend currently serves.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, AssistantError>;

    /// Cancel any in-flight streaming responses.
    fn abort_streams(&self) {}

    /// Whether the backend keeps streaming deltas when tools are offered.
    fn supports_streaming_with_tools(&self) -> bool {
        false
    }

    /// Cheap availability probe.
    async fn health_check(&self) -> Result<bool, AssistantError> {
        Ok(self.list_models().await.is_ok())
    }

    /// Ask the backend to load a model into memory ahead of the first real
    /// request. The single-token exchange is enough to make local runtimes
    /// page the weights in.
    async fn warm_up(&self, model: &str) -> Result<(), AssistantError> {
        let request = ClientChatRequest {
            model: model.to_string(),
            messages: vec![WireMessage::user("ping")],
            temperature: Some(0.0),
            max_tokens: Some(1),
            top_p: None,
        };
        self.chat(&request).await.map(|_| ())
    }
}

impl std::fmt::Debug for dyn LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider_id", &self.provider_id())
            .finish_non_exhaustive()
    }
}
