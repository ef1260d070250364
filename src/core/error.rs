use std::io;
use thiserror::Error;

/// Unified error type for the Archie assistant core.
///
/// Only the provider-setup variants (`NoProviderConfigured`,
/// `ProviderNotFound`, `ProviderDisabled`, `ProviderSwitchFailed`) escape
/// `Assistant::send_chat_message`; every other variant is converted into an
/// error-shaped assistant message at the public boundary.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// No client is active and the request named no provider.
    #[error("No API client configured. Please select a provider.")]
    NoProviderConfigured,

    /// The requested provider id is not in the registry.
    #[error("Provider {0} not found or not configured")]
    ProviderNotFound(String),

    /// The requested provider exists but is switched off.
    #[error("Provider {0} is not enabled")]
    ProviderDisabled(String),

    /// Switching the active client to the requested provider failed.
    #[error("Failed to switch to provider {provider}: {reason}")]
    ProviderSwitchFailed { provider: String, reason: String },

    /// A stream was cancelled by the user.
    #[error("{0}")]
    Aborted(String),

    /// Upstream API errors (bad status, malformed response body).
    #[error("API error: {0}")]
    Api(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Tool lookup failures
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// MCP connection errors
    #[error("MCP connection error: {0}")]
    McpConnection(String),

    /// Unknown or unexpected errors
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AssistantError {
    /// Whether this error records a user-initiated stream abort rather than
    /// a real failure. Matches the typed variant plus the known abort
    /// phrases that network layers smuggle inside error text (substring,
    /// case-sensitive).
    pub fn is_abort(&self) -> bool {
        if matches!(self, AssistantError::Aborted(_)) {
            return true;
        }
        let text = self.to_string();
        text.contains("aborted")
            || text.contains("BodyStreamBuffer was aborted")
            || text.contains("AbortError")
    }

    /// True for the provider-setup errors that propagate out of
    /// `send_chat_message` instead of being recovered into a message.
    pub fn is_provider_setup(&self) -> bool {
        matches!(
            self,
            AssistantError::NoProviderConfigured
                | AssistantError::ProviderNotFound(_)
                | AssistantError::ProviderDisabled(_)
                | AssistantError::ProviderSwitchFailed { .. }
        )
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AssistantError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            AssistantError::Network(format!("Connection failed: {}", err))
        } else if err.is_status() {
            AssistantError::Api(format!("API returned error status: {}", err))
        } else {
            AssistantError::Network(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for AssistantError {
    fn from(err: serde_yml::Error) -> Self {
        AssistantError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<String> for AssistantError {
    fn from(err: String) -> Self {
        AssistantError::Unknown(err)
    }
}

impl From<&str> for AssistantError {
    fn from(err: &str) -> Self {
        AssistantError::Unknown(err.to_string())
    }
}
