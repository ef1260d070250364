use crate::core::error::AssistantError;
use crate::providers::{ClientChatRequest, LlmClient, WireMessage};
use crate::tools::Tool;
use crate::types::{
    AiConfig, AttachmentKind, ChatMessage, ChunkHandler, MessageMetadata, MessageRole,
    ProcessedAttachment,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything a standard-mode exchange needs, bundled so the orchestrator
/// hands over one value.
pub struct ChatRun {
    pub client: Arc<dyn LlmClient>,
    pub provider_id: String,
    pub model: String,
    pub message: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub config: AiConfig,
    pub attachments: Vec<ProcessedAttachment>,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub on_chunk: Option<ChunkHandler>,
    pub stop: Arc<AtomicBool>,
    pub disable_streaming: bool,
}

/// Single-exchange executor seam.
#[async_trait]
pub trait ChatExecutor: Send + Sync {
    async fn run(&self, run: ChatRun) -> Result<ChatMessage, AssistantError>;

    /// Asks the backend to page a model in ahead of first use.
    async fn preload(
        &self,
        client: Arc<dyn LlmClient>,
        model: &str,
    ) -> Result<(), AssistantError>;
}

/// One request, one reply. Streams deltas to the caller unless streaming
/// was ruled out for this exchange, in which case a single blocking call is
/// made instead.
pub struct StandardChatExecutor;

impl StandardChatExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StandardChatExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatExecutor for StandardChatExecutor {
    async fn run(&self, run: ChatRun) -> Result<ChatMessage, AssistantError> {
        let instructions = tool_instructions(&run.tools);
        let messages = wire_messages(
            run.system_prompt.as_deref(),
            instructions,
            &run.history,
            &run.message,
            &run.attachments,
        );
        let params = &run.config.parameters;
        let mut request = ClientChatRequest::new(run.model.clone(), messages);
        request.temperature = Some(params.temperature);
        request.max_tokens = params.max_tokens;
        request.top_p = params.top_p;

        let streaming = run.on_chunk.is_some() && !run.disable_streaming;
        tracing::debug!(
            provider = %run.provider_id,
            model = %run.model,
            streaming,
            tools = run.tools.len(),
            "standard chat exchange"
        );

        let content = if streaming {
            let mut stream = run.client.chat_stream(&request).await?;
            let mut full = String::new();
            while let Some(chunk) = stream.next().await {
                if run.stop.load(Ordering::SeqCst) {
                    return Err(AssistantError::Aborted(
                        "Stream was stopped by user".to_string(),
                    ));
                }
                let chunk = chunk?;
                if let Some(handler) = &run.on_chunk {
                    handler(&chunk);
                }
                full.push_str(&chunk);
            }
            if run.stop.load(Ordering::SeqCst) {
                return Err(AssistantError::Aborted(
                    "Stream was stopped by user".to_string(),
                ));
            }
            full
        } else {
            run.client.chat(&request).await?
        };

        let mut metadata = MessageMetadata::default();
        metadata.model = Some(format!("{}:{}", run.provider_id, run.model));
        metadata.temperature = Some(params.temperature);
        Ok(ChatMessage::assistant(content, metadata))
    }

    async fn preload(
        &self,
        client: Arc<dyn LlmClient>,
        model: &str,
    ) -> Result<(), AssistantError> {
        client.warm_up(model).await
    }
}

/// System messages first, then prior turns, then the new user message with
/// its attachments inlined. Empty turns (aborted ones) are not replayed.
pub(crate) fn wire_messages(
    system_prompt: Option<&str>,
    tool_instructions: Option<String>,
    history: &[ChatMessage],
    message: &str,
    attachments: &[ProcessedAttachment],
) -> Vec<WireMessage> {
    let mut messages = Vec::new();
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        messages.push(WireMessage::system(prompt));
    }
    if let Some(instructions) = tool_instructions {
        messages.push(WireMessage::system(instructions));
    }
    for turn in history {
        if turn.content.trim().is_empty() {
            continue;
        }
        messages.push(match turn.role {
            MessageRole::User => WireMessage::user(&turn.content),
            MessageRole::Assistant => WireMessage::assistant(&turn.content),
        });
    }
    messages.push(WireMessage::user(compose_user_message(message, attachments)));
    messages
}

pub(crate) fn compose_user_message(message: &str, attachments: &[ProcessedAttachment]) -> String {
    if attachments.is_empty() {
        return message.to_string();
    }
    let mut out = message.to_string();
    for attachment in attachments {
        match attachment.kind {
            AttachmentKind::Text | AttachmentKind::Binary => {
                if let Some(text) = &attachment.text {
                    out.push_str(&format!("\n\n[Attachment: {}]\n{}", attachment.name, text));
                }
            }
            AttachmentKind::Image => {
                out.push_str(&format!("\n\n[Image attached: {}]", attachment.name));
            }
        }
    }
    out
}

/// Prompt block advertising the offered tools and the JSON shape a call
/// must take. `None` when nothing is offered.
pub(crate) fn tool_instructions(tools: &[Arc<dyn Tool>]) -> Option<String> {
    if tools.is_empty() {
        return None;
    }
    let mut out = String::from("You have access to the following tools:\n");
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
    }
    out.push_str("\nWhen you need to use a tool, output a JSON object with these fields:\n");
    out.push_str(
        "{\n  \"tool\": \"tool_name\",\n  \"arguments\": {\n    \"param1\": value1,\n    \"param2\": value2\n  }\n}\n",
    );
    Some(out)
}
