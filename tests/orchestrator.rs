//! End-to-end dispatch behavior of the `Assistant` orchestrator, exercised
//! through stub executors that record exactly what reaches them.

use archie::agent::{AgentExecutor, AgentRun};
use archie::attachments::AttachmentProcessor;
use archie::chat::{ChatExecutor, ChatRun};
use archie::notifications::{BufferedSink, NotificationKind};
use archie::providers::ClientFactory;
use archie::types::{AgentSettings, ProcessedAttachment};
use archie::{
    AiConfig, Assistant, AssistantError, ChatMessage, ChatRequest, FileAttachment, LlmClient,
    MessageMetadata, MessageRole, Provider, ProviderKind, ProviderRegistry,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

// ── Stub collaborators ───────────────────────────────────────────────────

#[derive(Default)]
struct CountingAttachments {
    calls: AtomicU32,
}

#[async_trait]
impl AttachmentProcessor for CountingAttachments {
    async fn process(
        &self,
        _attachments: &[FileAttachment],
    ) -> Result<Vec<ProcessedAttachment>, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Agent stub: records the model of every run, replies with fixed step and
/// tool metadata, and fails once when an error is scripted.
#[derive(Default)]
struct StubAgent {
    models: Mutex<Vec<String>>,
    error: Mutex<Option<AssistantError>>,
    stop_signals: AtomicU32,
}

impl StubAgent {
    fn runs(&self) -> usize {
        self.models.lock().len()
    }
}

#[async_trait]
impl AgentExecutor for StubAgent {
    async fn run(&self, run: AgentRun) -> Result<ChatMessage, AssistantError> {
        self.models.lock().push(run.model.clone());
        if let Some(error) = self.error.lock().take() {
            return Err(error);
        }
        let mut metadata = MessageMetadata::default();
        metadata.model = Some(format!("{}:{}", run.client.provider_id(), run.model));
        metadata.agent_steps = Some(3);
        metadata.tools_used = Some(vec!["search".to_string()]);
        Ok(ChatMessage::assistant("agent reply", metadata))
    }

    fn stop(&self) {
        self.stop_signals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Chat stub mirroring `StubAgent` for the standard path, plus a preload
/// recorder.
#[derive(Default)]
struct StubChat {
    models: Mutex<Vec<String>>,
    preloads: Mutex<Vec<String>>,
    error: Mutex<Option<AssistantError>>,
}

impl StubChat {
    fn runs(&self) -> usize {
        self.models.lock().len()
    }
}

#[async_trait]
impl ChatExecutor for StubChat {
    async fn run(&self, run: ChatRun) -> Result<ChatMessage, AssistantError> {
        self.models.lock().push(run.model.clone());
        if let Some(error) = self.error.lock().take() {
            return Err(error);
        }
        let mut metadata = MessageMetadata::default();
        metadata.model = Some(format!("{}:{}", run.provider_id, run.model));
        metadata.temperature = Some(run.config.parameters.temperature);
        Ok(ChatMessage::assistant("standard reply", metadata))
    }

    async fn preload(
        &self,
        _client: Arc<dyn LlmClient>,
        model: &str,
    ) -> Result<(), AssistantError> {
        self.preloads.lock().push(model.to_string());
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    assistant: Assistant,
    registry: Arc<ProviderRegistry>,
    attachments: Arc<CountingAttachments>,
    agent: Arc<StubAgent>,
    chat: Arc<StubChat>,
    notices: Arc<BufferedSink>,
}

/// Three providers: `p1` and `p3` usable, `p2` disabled. `p3` points at a
/// remote base URL so it does not count as local.
fn harness() -> Harness {
    let p1 = Provider::new("p1", "Provider One", ProviderKind::Custom);
    let mut p2 = Provider::new("p2", "Provider Two", ProviderKind::Custom);
    p2.enabled = false;
    let mut p3 = Provider::new("p3", "Provider Three", ProviderKind::Custom);
    p3.base_url = "https://api.example.com/v1".to_string();

    let registry = Arc::new(ProviderRegistry::with_providers(
        ClientFactory::new(),
        vec![p1, p2, p3],
        Some("p1".to_string()),
    ));
    let attachments = Arc::new(CountingAttachments::default());
    let agent = Arc::new(StubAgent::default());
    let chat = Arc::new(StubChat::default());
    let notices = Arc::new(BufferedSink::new());

    let assistant = Assistant::builder()
        .registry(registry.clone())
        .attachments(attachments.clone())
        .agent(agent.clone())
        .chat(chat.clone())
        .notifications(notices.clone())
        .build();

    Harness {
        assistant,
        registry,
        attachments,
        agent,
        chat,
        notices,
    }
}

impl Harness {
    fn activate(&self, id: &str) -> Arc<dyn LlmClient> {
        self.registry.make_current(id).unwrap()
    }

    fn fail_agent(self, error: AssistantError) -> Self {
        *self.agent.error.lock() = Some(error);
        self
    }

    fn fail_chat(self, error: AssistantError) -> Self {
        *self.chat.error.lock() = Some(error);
        self
    }
}

fn config_for(provider: &str, model: &str) -> AiConfig {
    let mut config = AiConfig::default();
    config.provider = Some(provider.to_string());
    config.models.text = Some(model.to_string());
    config
}

fn standard(mut config: AiConfig) -> AiConfig {
    config.autonomous_agent = Some(AgentSettings {
        enabled: false,
        ..Default::default()
    });
    config
}

// ── Provider reconciliation ──────────────────────────────────────────────

#[tokio::test]
async fn no_provider_and_no_client_fails_with_nothing_invoked() {
    let h = harness();
    let request = ChatRequest::new("hi", AiConfig::default());

    let err = h.assistant.send_chat_message(request).await.unwrap_err();
    assert!(matches!(err, AssistantError::NoProviderConfigured));
    assert_eq!(h.attachments.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.agent.runs(), 0);
    assert_eq!(h.chat.runs(), 0);
}

#[tokio::test]
async fn unknown_provider_is_rejected_before_any_seam_fires() {
    let h = harness();
    h.activate("p1");
    let request = ChatRequest::new("hi", config_for("ghost", "m1"));

    let err = h.assistant.send_chat_message(request).await.unwrap_err();
    assert!(matches!(err, AssistantError::ProviderNotFound(id) if id == "ghost"));
    assert_eq!(h.attachments.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.agent.runs(), 0);
    assert_eq!(h.chat.runs(), 0);
    assert_eq!(h.registry.current_provider().unwrap().id, "p1");
}

#[tokio::test]
async fn disabled_provider_is_rejected_before_any_seam_fires() {
    let h = harness();
    h.activate("p1");
    let request = ChatRequest::new("hi", config_for("p2", "m1"));

    let err = h.assistant.send_chat_message(request).await.unwrap_err();
    assert!(matches!(err, AssistantError::ProviderDisabled(id) if id == "p2"));
    assert_eq!(h.attachments.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.agent.runs(), 0);
    assert_eq!(h.chat.runs(), 0);
    assert!(h.notices.is_empty());
    assert_eq!(h.registry.current_provider().unwrap().id, "p1");
}

#[tokio::test]
async fn matching_provider_keeps_the_client_identity() {
    let h = harness();
    let before = h.activate("p1");

    let request = ChatRequest::new("hi", config_for("p1", "m1"));
    h.assistant.send_chat_message(request).await.unwrap();

    let after = h.registry.current_client().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(h.agent.runs(), 1);
}

#[tokio::test]
async fn differing_provider_installs_the_requested_client() {
    let h = harness();
    let before = h.activate("p1");

    let request = ChatRequest::new("hi", config_for("p3", "m1"));
    h.assistant.send_chat_message(request).await.unwrap();

    let after = h.registry.current_client().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(h.registry.current_provider().unwrap().id, "p3");
    assert_eq!(after.provider_id(), "p3");
}

// ── Mode dispatch ────────────────────────────────────────────────────────

#[tokio::test]
async fn autonomous_mode_is_the_default_dispatch() {
    let h = harness();
    h.activate("p1");

    let request = ChatRequest::new("hi", config_for("p1", "m1"));
    let message = h.assistant.send_chat_message(request).await.unwrap();

    assert_eq!(message.content, "agent reply");
    assert_eq!(h.agent.runs(), 1);
    assert_eq!(h.chat.runs(), 0);
    assert_eq!(h.attachments.calls.load(Ordering::SeqCst), 1);

    let notices = h.notices.drain();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].kind, NotificationKind::Info);
    assert_eq!(notices[0].title, "Autonomous Mode Activated");
    assert_eq!(notices[1].kind, NotificationKind::Completion);
    assert_eq!(notices[1].title, "Autonomous Agent Complete");
    assert_eq!(notices[1].message, "Completed in 3 steps using 1 tools.");
}

#[tokio::test]
async fn explicit_opt_out_takes_the_standard_path() {
    let h = harness();
    h.activate("p1");

    let request = ChatRequest::new("hi", standard(config_for("p1", "m1")));
    let message = h.assistant.send_chat_message(request).await.unwrap();

    assert_eq!(message.content, "standard reply");
    assert_eq!(message.role, MessageRole::Assistant);
    assert_eq!(h.chat.runs(), 1);
    assert_eq!(h.agent.runs(), 0);
    assert!(h.notices.is_empty());
}

#[tokio::test]
async fn standard_run_on_the_active_provider_records_no_switch() {
    let h = harness();
    let before = h.activate("p1");

    let mut config = standard(config_for("p1", "m1"));
    config.parameters.temperature = 0.7;
    let message = h
        .assistant
        .send_chat_message(ChatRequest::new("hi", config))
        .await
        .unwrap();

    assert_eq!(message.metadata.model.as_deref(), Some("p1:m1"));
    assert_eq!(*h.chat.models.lock(), vec!["m1".to_string()]);
    assert_eq!(h.agent.runs(), 0);
    assert!(Arc::ptr_eq(&before, &h.registry.current_client().unwrap()));
}

#[tokio::test]
async fn provider_prefixed_model_ids_are_stripped_for_known_providers() {
    let h = harness();
    h.activate("p1");

    let request = ChatRequest::new("hi", standard(config_for("p1", "p1:m1")));
    h.assistant.send_chat_message(request).await.unwrap();

    let request = ChatRequest::new("hi", standard(config_for("p1", "other:m1")));
    h.assistant.send_chat_message(request).await.unwrap();

    assert_eq!(
        *h.chat.models.lock(),
        vec!["m1".to_string(), "other:m1".to_string()]
    );
}

// ── Abort and error classification ───────────────────────────────────────

#[tokio::test]
async fn abort_during_the_chat_executor_shapes_the_reply() {
    let h = harness().fail_chat(AssistantError::Unknown("AbortError".to_string()));
    h.activate("p1");

    let mut config = standard(config_for("p1", "m1"));
    config.parameters.temperature = 0.7;
    let message = h
        .assistant
        .send_chat_message(ChatRequest::new("hi", config))
        .await
        .unwrap();

    assert!(message.id.ends_with("-aborted"));
    assert!(message.content.is_empty());
    assert_eq!(message.metadata.model.as_deref(), Some("p1:m1"));
    assert_eq!(message.metadata.temperature, Some(0.7));
    assert_eq!(message.metadata.aborted, Some(true));
    assert_eq!(
        message.metadata.error.as_deref(),
        Some("Stream was stopped by user")
    );
    assert!(message.metadata.agent_steps.is_none());
    assert!(message.metadata.tools_used.is_none());
    assert!(message.metadata.extra.is_empty());
}

#[tokio::test]
async fn abort_during_the_agent_executor_shapes_the_reply() {
    let h = harness().fail_agent(AssistantError::Aborted(
        "Autonomous run stopped by user".to_string(),
    ));
    h.activate("p1");

    let request = ChatRequest::new("hi", config_for("p1", "m1"));
    let message = h.assistant.send_chat_message(request).await.unwrap();

    assert!(message.id.ends_with("-aborted"));
    assert!(message.content.is_empty());
    assert_eq!(message.metadata.aborted, Some(true));

    // The activation notice went out before the agent failed; no completion
    // notice follows an abort.
    let notices = h.notices.drain();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Autonomous Mode Activated");
}

#[tokio::test]
async fn executor_failures_come_back_as_error_shaped_messages() {
    let h = harness().fail_chat(AssistantError::Api("rate limited".to_string()));
    h.activate("p1");

    let request = ChatRequest::new("hi", standard(config_for("p1", "m1")));
    let message = h.assistant.send_chat_message(request).await.unwrap();

    assert!(message.id.ends_with("-error"));
    assert_eq!(
        message.content,
        "I apologize, but I encountered an error while processing your request. Please try again."
    );
    assert_eq!(
        message.metadata.error.as_deref(),
        Some("API error: rate limited")
    );
    assert!(message.metadata.aborted.is_none());
}

// ── Stop signal ──────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_twice_delegates_each_time_and_leaves_the_assistant_usable() {
    let h = harness();
    h.activate("p1");

    h.assistant.stop();
    h.assistant.stop();
    assert_eq!(h.agent.stop_signals.load(Ordering::SeqCst), 2);

    // A fresh request clears the stop flag and runs normally.
    let request = ChatRequest::new("hi", standard(config_for("p1", "m1")));
    let message = h.assistant.send_chat_message(request).await.unwrap();
    assert_eq!(message.content, "standard reply");
}

// ── Model preloading ─────────────────────────────────────────────────────

#[tokio::test]
async fn preload_warms_local_backends_only() {
    let h = harness();
    h.activate("p1");

    h.assistant.preload_model(&config_for("p1", "m1"), &[]).await;
    assert_eq!(*h.chat.preloads.lock(), vec!["m1".to_string()]);

    // Remote providers and empty model slots are both skipped.
    h.activate("p3");
    h.assistant.preload_model(&config_for("p3", "m1"), &[]).await;
    h.activate("p1");
    h.assistant.preload_model(&config_for("p1", "  "), &[]).await;
    assert_eq!(h.chat.preloads.lock().len(), 1);
}
