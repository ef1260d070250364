use crate::agent::{AgentExecutor, AgentRun, ToolLoopAgent};
use crate::attachments::{AttachmentProcessor, DefaultAttachmentProcessor};
use crate::chat::{ChatExecutor, ChatRun, StandardChatExecutor};
use crate::core::error::AssistantError;
use crate::models::ModelSelector;
use crate::notifications::{NotificationSink, NullSink};
use crate::providers::{ClientFactory, LlmClient, ModelInfo, Provider, ProviderRegistry};
use crate::tools::ToolRegistry;
use crate::types::{
    AiConfig, ChatMessage, ChatRequest, MessageMetadata, MessageRole, timestamp_id,
};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const ERROR_APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// The chat orchestrator. Owns the provider registry and the collaborator
/// seams, produces exactly one response message per request, and keeps
/// every runtime failure inside that message. Only provider-setup errors
/// escape as `Err`.
pub struct Assistant {
    registry: Arc<ProviderRegistry>,
    selector: ModelSelector,
    tools: Arc<ToolRegistry>,
    attachments: Arc<dyn AttachmentProcessor>,
    agent: Arc<dyn AgentExecutor>,
    chat: Arc<dyn ChatExecutor>,
    notifications: Arc<dyn NotificationSink>,
    stop_requested: Arc<AtomicBool>,
}

impl Assistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::default()
    }

    /// Sends one chat message through the full pipeline: provider
    /// reconciliation, attachment normalization, model resolution, tool
    /// acquisition, then the autonomous or standard branch.
    ///
    /// Aborts and runtime failures come back as a normal message with the
    /// outcome recorded in its metadata; the returned `Err` is reserved for
    /// provider-setup problems the caller can actually fix.
    pub async fn send_chat_message(
        &self,
        request: ChatRequest,
    ) -> Result<ChatMessage, AssistantError> {
        self.stop_requested.store(false, Ordering::SeqCst);

        if request.config.provider.is_none() && self.registry.current_client().is_none() {
            return Err(AssistantError::NoProviderConfigured);
        }
        self.ensure_correct_provider(&request.config)?;
        let client = self
            .registry
            .current_client()
            .ok_or(AssistantError::NoProviderConfigured)?;

        match self.run_chat(client, &request).await {
            Ok(message) => Ok(message),
            Err(e) if e.is_abort() => {
                tracing::info!("stream aborted by user, returning empty turn");
                Ok(self.aborted_message(&request.config))
            }
            Err(e) => {
                tracing::error!(error = %e, "chat execution failed");
                Ok(error_message(&e))
            }
        }
    }

    /// Signals the in-flight request to wind down: sets the stop flag the
    /// executors poll, tells the agent to halt at its next step boundary,
    /// and cancels any streaming response on the active client. Safe to
    /// call repeatedly or with nothing running.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.agent.stop();
        if let Some(client) = self.registry.current_client() {
            client.abort_streams();
            tracing::debug!("requested stream abort on the active client");
        }
    }

    /// Warms the configured text model on local backends so the first real
    /// request does not pay the load time. Never fails; preload problems
    /// are logged and dropped.
    pub async fn preload_model(&self, config: &AiConfig, history: &[ChatMessage]) {
        let Some(client) = self.registry.current_client() else {
            return;
        };
        let has_text_model = config
            .models
            .text
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        if !has_text_model {
            return;
        }
        let Some(provider) = self.registry.current_provider() else {
            return;
        };
        if !provider.is_local() {
            return;
        }

        let raw = match self.selector.select(config, &[], history) {
            Ok(model) => model,
            Err(e) => {
                tracing::debug!(error = %e, "nothing to preload");
                return;
            }
        };
        let model = self.selector.extract_model_id(&raw, &self.provider_ids());
        tracing::debug!(model = %model, provider = %provider.id, "preloading model");
        if let Err(e) = self.chat.preload(client, &model).await {
            tracing::warn!(model = %model, error = %e, "model preload failed");
        }
    }

    pub fn get_providers(&self) -> Vec<Provider> {
        self.registry.list()
    }

    pub async fn get_models(
        &self,
        provider_id: Option<&str>,
    ) -> Result<Vec<ModelInfo>, AssistantError> {
        self.registry.get_models(provider_id).await
    }

    pub async fn get_current_provider_models(&self) -> Result<Vec<ModelInfo>, AssistantError> {
        self.registry.get_models(None).await
    }

    pub fn get_primary_provider(&self) -> Option<Provider> {
        self.registry.primary()
    }

    pub fn set_primary_provider(&self, provider_id: &str) -> Result<(), AssistantError> {
        self.registry.set_primary(provider_id)
    }

    pub fn update_provider(&self, provider: Provider) -> Result<(), AssistantError> {
        self.registry.update_provider(provider)
    }

    pub async fn health_check(&self) -> Result<bool, AssistantError> {
        self.registry.health_check().await
    }

    pub async fn test_provider(&self, provider: &Provider) -> Result<bool, AssistantError> {
        self.registry.test_provider(provider).await
    }

    pub fn current_client(&self) -> Option<Arc<dyn LlmClient>> {
        self.registry.current_client()
    }

    pub fn current_provider(&self) -> Option<Provider> {
        self.registry.current_provider()
    }

    pub fn tool_registry(&self) -> Arc<ToolRegistry> {
        self.tools.clone()
    }

    /// Attributes a successful tool invocation to the active provider.
    pub fn record_tool_success(&self, tool_name: &str) {
        let provider = self
            .current_provider()
            .map(|p| p.id)
            .unwrap_or_else(|| "unknown".to_string());
        self.tools.record_success(tool_name, &provider);
    }

    /// Lifts every blacklist entry for the active provider and tells the
    /// user about it.
    pub fn clear_blacklisted_tools(&self) {
        let Some(provider) = self.current_provider() else {
            return;
        };
        if self.registry.current_client().is_none() {
            return;
        }
        let cleared = self.tools.clear_blacklisted(&provider.id);
        tracing::debug!(provider = %provider.id, cleared, "cleared tool blacklist");
        self.notifications.info(
            "Tools Reset",
            &format!(
                "Cleared incorrectly blacklisted tools for {}.",
                provider.name
            ),
        );
    }

    fn ensure_correct_provider(&self, config: &AiConfig) -> Result<(), AssistantError> {
        let Some(requested) = config.provider.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(());
        };
        let current = self.registry.current_provider();
        if current.as_ref().is_some_and(|c| c.id == requested) {
            tracing::debug!(provider = %requested, "already on the requested provider");
            return Ok(());
        }
        tracing::info!(
            from = %current.map(|c| c.id).unwrap_or_else(|| "none".to_string()),
            to = %requested,
            "switching provider"
        );
        self.registry.make_current(requested)?;
        Ok(())
    }

    async fn run_chat(
        &self,
        client: Arc<dyn LlmClient>,
        request: &ChatRequest,
    ) -> Result<ChatMessage, AssistantError> {
        let config = &request.config;

        let attachments = self.attachments.process(&request.attachments).await?;
        self.ensure_not_stopped()?;

        let raw_model = self.selector.select(config, &attachments, &request.history)?;
        let model = self.selector.extract_model_id(&raw_model, &self.provider_ids());

        let provider_id = client.provider_id().to_string();
        let tools = self.tools.available_tools(config, &provider_id);
        self.ensure_not_stopped()?;

        if config.autonomous_enabled() {
            tracing::info!(model = %model, tools = tools.len(), "running in autonomous mode");
            self.notifications.info(
                "Autonomous Mode Activated",
                "Archie is now operating in autonomous mode.",
            );

            let result = self
                .agent
                .run(AgentRun {
                    client,
                    model,
                    message: request.message.clone(),
                    tools,
                    config: config.clone(),
                    attachments,
                    system_prompt: request.system_prompt.clone(),
                    history: request.history.clone(),
                    on_chunk: request.on_chunk.clone(),
                    stop: self.stop_requested.clone(),
                })
                .await?;

            let steps = result.metadata.agent_steps.filter(|s| *s > 0).unwrap_or(1);
            let tool_count = result
                .metadata
                .tools_used
                .as_ref()
                .map(|t| t.len())
                .unwrap_or(0);
            let tools_part = if tool_count > 0 {
                format!(" using {} tools", tool_count)
            } else {
                String::new()
            };
            self.notifications.completion(
                "Autonomous Agent Complete",
                &format!("Completed in {} steps{}.", steps, tools_part),
            );
            Ok(result)
        } else {
            let disable_streaming = !tools.is_empty() && !client.supports_streaming_with_tools();
            tracing::info!(
                model = %model,
                tools = tools.len(),
                disable_streaming,
                "running in standard mode"
            );
            self.chat
                .run(ChatRun {
                    client,
                    provider_id,
                    model,
                    message: request.message.clone(),
                    tools,
                    config: config.clone(),
                    attachments,
                    system_prompt: request.system_prompt.clone(),
                    history: request.history.clone(),
                    on_chunk: request.on_chunk.clone(),
                    stop: self.stop_requested.clone(),
                    disable_streaming,
                })
                .await
        }
    }

    fn ensure_not_stopped(&self) -> Result<(), AssistantError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(AssistantError::Aborted(
                "Chat generation stopped by user".to_string(),
            ));
        }
        Ok(())
    }

    fn provider_ids(&self) -> Vec<String> {
        self.registry.list().into_iter().map(|p| p.id).collect()
    }

    fn aborted_message(&self, config: &AiConfig) -> ChatMessage {
        let provider = config
            .provider
            .clone()
            .or_else(|| self.registry.current_provider().map(|p| p.id))
            .unwrap_or_else(|| "unknown".to_string());
        let model = config
            .models
            .text
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let mut metadata = MessageMetadata::default();
        metadata.model = Some(format!("{}:{}", provider, model));
        metadata.temperature = Some(config.parameters.temperature);
        metadata.aborted = Some(true);
        metadata.error = Some("Stream was stopped by user".to_string());

        ChatMessage {
            id: timestamp_id("aborted"),
            role: MessageRole::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            metadata,
            attachments: Vec::new(),
        }
    }
}

fn error_message(error: &AssistantError) -> ChatMessage {
    let mut metadata = MessageMetadata::default();
    metadata.error = Some(error.to_string());
    ChatMessage {
        id: timestamp_id("error"),
        role: MessageRole::Assistant,
        content: ERROR_APOLOGY.to_string(),
        timestamp: Utc::now(),
        metadata,
        attachments: Vec::new(),
    }
}

/// Wires an `Assistant` from its collaborators. Everything has a default so
/// embedders only swap the seams they care about.
pub struct AssistantBuilder {
    registry: Option<Arc<ProviderRegistry>>,
    tools: Option<Arc<ToolRegistry>>,
    attachments: Option<Arc<dyn AttachmentProcessor>>,
    agent: Option<Arc<dyn AgentExecutor>>,
    chat: Option<Arc<dyn ChatExecutor>>,
    notifications: Option<Arc<dyn NotificationSink>>,
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            tools: None,
            attachments: None,
            agent: None,
            chat: None,
            notifications: None,
        }
    }
}

impl AssistantBuilder {
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn attachments(mut self, attachments: Arc<dyn AttachmentProcessor>) -> Self {
        self.attachments = Some(attachments);
        self
    }

    pub fn agent(mut self, agent: Arc<dyn AgentExecutor>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn chat(mut self, chat: Arc<dyn ChatExecutor>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn build(self) -> Assistant {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ProviderRegistry::new(ClientFactory::new())));
        let tools = self.tools.unwrap_or_else(|| Arc::new(ToolRegistry::new()));
        let agent = self
            .agent
            .unwrap_or_else(|| Arc::new(ToolLoopAgent::new(tools.clone())));
        Assistant {
            registry,
            selector: ModelSelector::new(),
            tools,
            attachments: self
                .attachments
                .unwrap_or_else(|| Arc::new(DefaultAttachmentProcessor::new())),
            agent,
            chat: self.chat.unwrap_or_else(|| Arc::new(StandardChatExecutor::new())),
            notifications: self.notifications.unwrap_or_else(|| Arc::new(NullSink)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use crate::types::ChatParameters;

    fn registry_with_p1() -> Arc<ProviderRegistry> {
        let p1 = Provider::new("p1", "Provider One", ProviderKind::Custom);
        Arc::new(ProviderRegistry::with_providers(
            ClientFactory::new(),
            vec![p1],
            Some("p1".to_string()),
        ))
    }

    #[tokio::test]
    async fn missing_provider_and_client_fails_before_any_work() {
        let assistant = Assistant::builder().registry(registry_with_p1()).build();
        let request = ChatRequest::new("hi", AiConfig::default());

        let err = assistant.send_chat_message(request).await.unwrap_err();
        assert!(matches!(err, AssistantError::NoProviderConfigured));
    }

    #[test]
    fn matching_provider_does_not_rebuild_the_client() {
        let registry = registry_with_p1();
        registry.make_current("p1").unwrap();
        let before = registry.current_client().unwrap();

        let assistant = Assistant::builder().registry(registry.clone()).build();
        let mut config = AiConfig::default();
        config.provider = Some("p1".to_string());
        assistant.ensure_correct_provider(&config).unwrap();

        let after = registry.current_client().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn aborted_message_shape_follows_the_request_config() {
        let assistant = Assistant::builder().registry(registry_with_p1()).build();
        let mut config = AiConfig::default();
        config.provider = Some("p1".to_string());
        config.models.text = Some("m1".to_string());
        config.parameters = ChatParameters {
            temperature: 0.7,
            max_tokens: None,
            top_p: None,
        };

        let message = assistant.aborted_message(&config);
        assert!(message.id.ends_with("-aborted"));
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(message.content.is_empty());
        assert_eq!(message.metadata.model.as_deref(), Some("p1:m1"));
        assert_eq!(message.metadata.temperature, Some(0.7));
        assert_eq!(message.metadata.aborted, Some(true));
        assert_eq!(
            message.metadata.error.as_deref(),
            Some("Stream was stopped by user")
        );
    }

    #[test]
    fn error_message_keeps_the_raw_text_in_metadata() {
        let err = AssistantError::Api("boom".to_string());
        let message = error_message(&err);

        assert!(message.id.ends_with("-error"));
        assert_eq!(message.content, ERROR_APOLOGY);
        assert_eq!(message.metadata.error.as_deref(), Some("API error: boom"));
        assert!(message.metadata.aborted.is_none());
    }
}
