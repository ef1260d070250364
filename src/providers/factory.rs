use super::http::HttpChatClient;
use super::{LlmClient, Provider, ProviderKind};
use crate::core::error::AssistantError;
use std::collections::HashMap;
use std::sync::Arc;

type ClientCreator =
    Box<dyn Fn(&Provider) -> Result<Arc<dyn LlmClient>, AssistantError> + Send + Sync>;

/// Builds network clients from provider entries. One creator per backend
/// kind; hosted backends refuse to build without an API key so a bad switch
/// fails here instead of on the first request.
pub struct ClientFactory {
    creators: HashMap<ProviderKind, ClientCreator>,
}

impl ClientFactory {
    pub fn new() -> Self {
        let mut creators: HashMap<ProviderKind, ClientCreator> = HashMap::new();

        creators.insert(
            ProviderKind::OpenAi,
            Box::new(|provider: &Provider| {
                require_api_key(provider)?;
                Ok(Arc::new(HttpChatClient::new(provider)) as Arc<dyn LlmClient>)
            }),
        );

        creators.insert(
            ProviderKind::OpenRouter,
            Box::new(|provider: &Provider| {
                require_api_key(provider)?;
                Ok(Arc::new(HttpChatClient::new(provider)) as Arc<dyn LlmClient>)
            }),
        );

        creators.insert(
            ProviderKind::Ollama,
            Box::new(|provider: &Provider| {
                Ok(Arc::new(HttpChatClient::new(provider)) as Arc<dyn LlmClient>)
            }),
        );

        creators.insert(
            ProviderKind::Custom,
            Box::new(|provider: &Provider| {
                Ok(Arc::new(HttpChatClient::new(provider)) as Arc<dyn LlmClient>)
            }),
        );

        Self { creators }
    }

    pub fn create(&self, provider: &Provider) -> Result<Arc<dyn LlmClient>, AssistantError> {
        self.creators
            .get(&provider.kind)
            .ok_or_else(|| {
                AssistantError::Config(format!(
                    "No client available for provider kind {:?}",
                    provider.kind
                ))
            })
            .and_then(|creator| creator(provider))
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn require_api_key(provider: &Provider) -> Result<(), AssistantError> {
    match provider.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(AssistantError::Config(format!(
            "API key required for provider {}",
            provider.id
        ))),
    }
}
