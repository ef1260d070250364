use crate::chat::{tool_instructions, wire_messages};
use crate::core::error::AssistantError;
use crate::providers::{ClientChatRequest, LlmClient, WireMessage};
use crate::tools::{Tool, ToolRegistry};
use crate::types::{
    AiConfig, ChatMessage, ChunkHandler, MessageMetadata, ProcessedAttachment,
};
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Everything an autonomous run needs, bundled by the orchestrator.
pub struct AgentRun {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
    pub message: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub config: AiConfig,
    pub attachments: Vec<ProcessedAttachment>,
    pub system_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub on_chunk: Option<ChunkHandler>,
    pub stop: Arc<AtomicBool>,
}

/// Multi-step executor seam. The orchestrator invokes it and relays the
/// result; the loop inside is the executor's own business.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn run(&self, run: AgentRun) -> Result<ChatMessage, AssistantError>;

    /// Signal a running invocation to wind down at its next step boundary.
    fn stop(&self) {}
}

/// Agent that loops chat exchanges through the registered tools until the
/// model answers without a tool call or the step budget runs out. Tool
/// calls are detected in the model output as a JSON protocol advertised
/// through the system prompt.
pub struct ToolLoopAgent {
    registry: Arc<ToolRegistry>,
    halt: AtomicBool,
}

impl ToolLoopAgent {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            halt: AtomicBool::new(false),
        }
    }

    fn ensure_not_stopped(&self, run: &AgentRun) -> Result<(), AssistantError> {
        if run.stop.load(Ordering::SeqCst) || self.halt.load(Ordering::SeqCst) {
            return Err(AssistantError::Aborted(
                "Autonomous run stopped by user".to_string(),
            ));
        }
        Ok(())
    }

    async fn exchange(
        &self,
        run: &AgentRun,
        request: &ClientChatRequest,
    ) -> Result<String, AssistantError> {
        let Some(handler) = &run.on_chunk else {
            return run.client.chat(request).await;
        };
        let mut stream = run.client.chat_stream(request).await?;
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            if run.stop.load(Ordering::SeqCst) || self.halt.load(Ordering::SeqCst) {
                return Err(AssistantError::Aborted(
                    "Stream was stopped by user".to_string(),
                ));
            }
            let chunk = chunk?;
            handler(&chunk);
            full.push_str(&chunk);
        }
        Ok(full)
    }
}

#[async_trait]
impl AgentExecutor for ToolLoopAgent {
    async fn run(&self, run: AgentRun) -> Result<ChatMessage, AssistantError> {
        self.halt.store(false, Ordering::SeqCst);
        let provider_id = run.client.provider_id().to_string();
        let max_steps = run.config.max_agent_steps().max(1);
        let params = run.config.parameters.clone();

        let mut offered = run.tools.clone();
        let mut messages = wire_messages(
            run.system_prompt.as_deref(),
            tool_instructions(&offered),
            &run.history,
            &run.message,
            &run.attachments,
        );
        let mut steps: u32 = 0;
        let mut tools_used: Vec<String> = Vec::new();
        let mut retried_without_tools = false;

        let final_content = loop {
            self.ensure_not_stopped(&run)?;

            let mut request = ClientChatRequest::new(run.model.clone(), messages.clone());
            request.temperature = Some(params.temperature);
            request.max_tokens = params.max_tokens;
            request.top_p = params.top_p;

            let response = match self.exchange(&run, &request).await {
                Ok(response) => response,
                Err(e)
                    if !retried_without_tools
                        && !offered.is_empty()
                        && is_tool_schema_rejection(&e) =>
                {
                    tracing::warn!(
                        provider = %provider_id,
                        error = %e,
                        "provider rejected the tool schema, retrying without tools"
                    );
                    self.registry
                        .blacklist(&provider_id, offered.iter().map(|t| t.name().to_string()));
                    offered.clear();
                    retried_without_tools = true;
                    messages = wire_messages(
                        run.system_prompt.as_deref(),
                        None,
                        &run.history,
                        &run.message,
                        &run.attachments,
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            steps += 1;

            let Some(call) = detect_tool_call(&response) else {
                break response;
            };
            if steps >= max_steps {
                tracing::warn!(steps, "step budget exhausted with a pending tool call");
                break response;
            }

            tracing::debug!(step = steps, tool = %call.name, "executing tool call");
            let result_text = match self
                .registry
                .call_tool(&call.name, call.arguments.clone())
                .await
            {
                Ok(result) => {
                    self.registry.record_success(&call.name, &provider_id);
                    if !tools_used.contains(&call.name) {
                        tools_used.push(call.name.clone());
                    }
                    let pretty = serde_json::to_string_pretty(&result)
                        .unwrap_or_else(|_| result.to_string());
                    format!("Tool call result: {}", pretty)
                }
                Err(e) => format!("Tool call failed: {}", e),
            };
            messages.push(WireMessage::assistant(&response));
            messages.push(WireMessage::user(result_text));
        };

        let mut metadata = MessageMetadata::default();
        metadata.model = Some(format!("{}:{}", provider_id, run.model));
        metadata.temperature = Some(params.temperature);
        metadata.agent_steps = Some(steps.max(1));
        metadata.tools_used = Some(tools_used);
        Ok(ChatMessage::assistant(final_content, metadata))
    }

    fn stop(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }
}

/// A 4xx complaint that names tools or functions means the provider choked
/// on the offered tool schema rather than on the conversation itself.
fn is_tool_schema_rejection(error: &AssistantError) -> bool {
    match error {
        AssistantError::Api(text) => {
            let text = text.to_lowercase();
            (text.contains("400") || text.contains("invalid") || text.contains("not support"))
                && (text.contains("tool") || text.contains("function"))
        }
        _ => false,
    }
}

pub(crate) struct DetectedToolCall {
    pub name: String,
    pub arguments: Value,
}

static TOOL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""tool"\s*:\s*"([^"]+)"|```json\s*\{\s*"tool"\s*:\s*"([^"]+)"#).unwrap()
});

/// Finds a tool invocation in model output: either a bare JSON object or
/// one wrapped in a code fence.
pub(crate) fn detect_tool_call(message: &str) -> Option<DetectedToolCall> {
    let caps = TOOL_CALL_RE.captures(message)?;
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())?;
    if name.is_empty() {
        return None;
    }
    let payload = extract_json_payload(message);
    let arguments = payload.get("arguments").cloned().unwrap_or_else(|| json!({}));
    Some(DetectedToolCall { name, arguments })
}

fn extract_json_payload(message: &str) -> Value {
    if let Ok(value) = serde_json::from_str(message) {
        return value;
    }
    if let Some(start) = message.find("```json") {
        let code_start = start + 7;
        if let Some(end) = message[code_start..].find("```") {
            return serde_json::from_str(&message[code_start..code_start + end])
                .unwrap_or_else(|_| json!({}));
        }
    }
    if let Some(start) = message.find("```") {
        let code_start = start + 3;
        if let Some(end) = message[code_start..].find("```") {
            return serde_json::from_str(&message[code_start..code_start + end])
                .unwrap_or_else(|_| json!({}));
        }
    }
    let json_start = message.find('{').unwrap_or(0);
    let json_end = message.rfind('}').map(|pos| pos + 1).unwrap_or(message.len());
    serde_json::from_str(&message[json_start..json_end]).unwrap_or_else(|_| json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ContentStream, ModelInfo};
    use futures::stream;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct QueueClient {
        replies: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<u32>,
    }

    impl QueueClient {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(0),
            }
        }

        fn next_reply(&self) -> Result<String, AssistantError> {
            *self.calls.lock() += 1;
            match self.replies.lock().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(error)) => Err(AssistantError::Api(error)),
                None => Ok("done".to_string()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for QueueClient {
        fn provider_id(&self) -> &str {
            "p1"
        }

        async fn chat(&self, _request: &ClientChatRequest) -> Result<String, AssistantError> {
            self.next_reply()
        }

        async fn chat_stream(
            &self,
            _request: &ClientChatRequest,
        ) -> Result<ContentStream, AssistantError> {
            let reply = self.next_reply()?;
            Ok(stream::iter(vec![Ok(reply)]).boxed())
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, AssistantError> {
            Ok(Vec::new())
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "echoes its arguments"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn call(&self, args: Value) -> Result<Value, AssistantError> {
            Ok(json!({"echoed": args}))
        }
    }

    fn agent_with_echo() -> (ToolLoopAgent, Arc<ToolRegistry>) {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(Arc::new(EchoTool));
        (ToolLoopAgent::new(registry.clone()), registry)
    }

    fn run_for(client: Arc<dyn LlmClient>, registry: &ToolRegistry) -> AgentRun {
        let config = AiConfig::default();
        AgentRun {
            tools: registry.available_tools(&config, "p1"),
            client,
            model: "m1".to_string(),
            message: "do the thing".to_string(),
            config,
            attachments: Vec::new(),
            system_prompt: Some("be useful".to_string()),
            history: Vec::new(),
            on_chunk: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn plain_answer_finishes_in_one_step() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![Ok("here you go")]));

        let message = agent.run(run_for(client.clone(), &registry)).await.unwrap();
        assert_eq!(message.content, "here you go");
        assert_eq!(message.metadata.agent_steps, Some(1));
        assert_eq!(message.metadata.tools_used.as_deref(), Some(&[][..]));
        assert_eq!(message.metadata.model.as_deref(), Some("p1:m1"));
        assert_eq!(*client.calls.lock(), 1);
    }

    #[tokio::test]
    async fn tool_call_round_trip_then_final_answer() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![
            Ok(r#"{"tool": "echo", "arguments": {"value": 7}}"#),
            Ok("the echo said 7"),
        ]));

        let message = agent.run(run_for(client.clone(), &registry)).await.unwrap();
        assert_eq!(message.content, "the echo said 7");
        assert_eq!(message.metadata.agent_steps, Some(2));
        assert_eq!(
            message.metadata.tools_used.as_deref(),
            Some(&["echo".to_string()][..])
        );
        assert_eq!(registry.success_count("echo"), 1);
        assert_eq!(*client.calls.lock(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_failure_feeds_back_and_recovers() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![
            Ok(r#"{"tool": "ghost", "arguments": {}}"#),
            Ok("never mind, answering directly"),
        ]));

        let message = agent.run(run_for(client, &registry)).await.unwrap();
        assert_eq!(message.content, "never mind, answering directly");
        assert_eq!(message.metadata.tools_used.as_deref(), Some(&[][..]));
        assert_eq!(registry.success_count("ghost"), 0);
    }

    #[tokio::test]
    async fn step_budget_caps_the_loop() {
        let (agent, registry) = agent_with_echo();
        let call = r#"{"tool": "echo", "arguments": {}}"#;
        let client = Arc::new(QueueClient::new(vec![Ok(call), Ok(call), Ok(call), Ok(call)]));

        let mut run = run_for(client.clone(), &registry);
        run.config.autonomous_agent = Some(crate::types::AgentSettings {
            enabled: true,
            max_steps: 2,
        });

        let message = agent.run(run).await.unwrap();
        assert_eq!(message.metadata.agent_steps, Some(2));
        assert_eq!(*client.calls.lock(), 2);
        assert!(message.content.contains("echo"));
    }

    #[tokio::test]
    async fn schema_rejection_blacklists_and_retries_without_tools() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![
            Err("HTTP 400 Bad Request: tools are not supported"),
            Ok("worked without tools"),
        ]));

        let message = agent.run(run_for(client, &registry)).await.unwrap();
        assert_eq!(message.content, "worked without tools");
        assert_eq!(message.metadata.agent_steps, Some(1));
        assert!(registry.blacklisted("p1").contains("echo"));
    }

    #[tokio::test]
    async fn preset_stop_flag_aborts_before_any_call() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![Ok("unreachable")]));

        let mut run = run_for(client.clone(), &registry);
        run.stop = Arc::new(AtomicBool::new(true));

        let err = agent.run(run).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(*client.calls.lock(), 0);
    }

    #[tokio::test]
    async fn streaming_relays_chunks_for_each_step() {
        let (agent, registry) = agent_with_echo();
        let client = Arc::new(QueueClient::new(vec![Ok("streamed answer")]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut run = run_for(client, &registry);
        run.on_chunk = Some(Arc::new(move |chunk: &str| {
            sink.lock().push(chunk.to_string());
        }));

        let message = agent.run(run).await.unwrap();
        assert_eq!(message.content, "streamed answer");
        assert_eq!(*seen.lock(), vec!["streamed answer".to_string()]);
    }

    #[test]
    fn detects_bare_and_fenced_tool_calls() {
        let bare = r#"{"tool": "echo", "arguments": {"a": 1}}"#;
        let call = detect_tool_call(bare).unwrap();
        assert_eq!(call.name, "echo");
        assert_eq!(call.arguments, json!({"a": 1}));

        let fenced = "Let me check.\n```json\n{\"tool\": \"echo\", \"arguments\": {\"b\": 2}}\n```";
        let call = detect_tool_call(fenced).unwrap();
        assert_eq!(call.name, "echo");
        assert_eq!(call.arguments, json!({"b": 2}));

        assert!(detect_tool_call("no tools here").is_none());
    }

    #[test]
    fn missing_arguments_default_to_an_empty_object() {
        let call = detect_tool_call(r#"{"tool": "echo"}"#).unwrap();
        assert_eq!(call.arguments, json!({}));
    }
}
