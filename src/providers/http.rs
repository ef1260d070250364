use super::{
    ClientChatRequest, ContentStream, LlmClient, ModelInfo, Provider, ProviderKind, WireMessage,
};
use crate::core::error::AssistantError;
use async_trait::async_trait;
use futures::stream::{self, AbortHandle, Abortable, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

impl ChatCompletionRequest {
    fn from_request(request: &ClientChatRequest, streaming: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.clone(),
            stream: streaming.then_some(true),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// Collects content deltas out of one chunk of an SSE body. Returns `None`
/// when the chunk carried nothing displayable.
fn parse_sse_chunk(text: &str) -> Option<String> {
    let mut content = String::new();
    for line in text.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                break;
            }
            if let Ok(parsed) = serde_json::from_str::<StreamResponse>(data) {
                if let Some(choice) = parsed.choices.first() {
                    if let Some(delta) = &choice.delta.content {
                        content.push_str(delta);
                    }
                }
            }
        }
    }
    if content.is_empty() { None } else { Some(content) }
}

/// Client for OpenAI-style chat completion endpoints. All supported backends
/// (OpenAI, OpenRouter, Ollama, self-hosted gateways) speak this dialect.
pub struct HttpChatClient {
    provider_id: String,
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    extra_headers: HashMap<String, String>,
    http: Client,
    // Abort handles for streams that have started but not finished. The
    // paired flag tells the stream tail whether it ended by cancellation.
    active: Mutex<Vec<(AbortHandle, Arc<AtomicBool>)>>,
}

impl HttpChatClient {
    pub fn new(provider: &Provider) -> Self {
        Self {
            provider_id: provider.id.clone(),
            kind: provider.kind,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: provider.api_key.clone(),
            extra_headers: provider.headers.clone(),
            http: Client::new(),
            active: Mutex::new(Vec::new()),
        }
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        for (name, value) in &self.extra_headers {
            request = request.header(name, value);
        }
        request
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<reqwest::Response, AssistantError> {
        let url = format!("{}/{}", self.base_url, path);
        let request = self
            .apply_headers(self.http.post(&url))
            .header("Content-Type", "application/json")
            .json(payload);
        let response = request.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.chars().take(300).collect();
    Err(AssistantError::Api(format!("HTTP {status}: {detail}")))
}

#[async_trait]
impl LlmClient for HttpChatClient {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    async fn chat(&self, request: &ClientChatRequest) -> Result<String, AssistantError> {
        let payload = ChatCompletionRequest::from_request(request, false);
        let response = self.post("chat/completions", &payload).await?;
        let body = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AssistantError::Api("No choices in API response".to_string()))?;
        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AssistantError::Api(
                "Empty response received from API".to_string(),
            ));
        }
        Ok(content.trim().to_string())
    }

    async fn chat_stream(
        &self,
        request: &ClientChatRequest,
    ) -> Result<ContentStream, AssistantError> {
        let payload = ChatCompletionRequest::from_request(request, true);
        let response = self.post("chat/completions", &payload).await?;

        let (handle, registration) = AbortHandle::new_pair();
        let aborted = Arc::new(AtomicBool::new(false));
        self.active.lock().push((handle, aborted.clone()));

        let deltas = Abortable::new(response.bytes_stream(), registration)
            .map(|item| match item {
                Ok(chunk) => String::from_utf8(chunk.to_vec())
                    .map_err(|e| AssistantError::Api(format!("Invalid UTF-8 in stream: {e}"))),
                Err(e) => Err(AssistantError::Network(e.to_string())),
            })
            .filter_map(|item| async move {
                match item {
                    Ok(text) => parse_sse_chunk(&text).map(Ok),
                    Err(e) => Some(Err(e)),
                }
            });

        // When the byte stream was cut by abort_streams the SSE body just
        // ends; surface the cancellation as an error so callers can tell it
        // apart from natural completion.
        let tail = stream::once(async move {
            Err::<String, _>(AssistantError::Aborted(
                "Stream was stopped by user".to_string(),
            ))
        })
        .filter(move |_| {
            let hit = aborted.load(Ordering::SeqCst);
            async move { hit }
        });

        Ok(deltas.chain(tail).boxed())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, AssistantError> {
        let url = format!("{}/models", self.base_url);
        let response = self.apply_headers(self.http.get(&url)).send().await?;
        let response = check_status(response).await?;
        let parsed: ModelsResponse = serde_json::from_str(&response.text().await?)?;

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                name: entry.id.clone(),
                id: entry.id,
                provider: self.provider_id.clone(),
            })
            .collect())
    }

    fn abort_streams(&self) {
        let mut active = self.active.lock();
        if active.is_empty() {
            return;
        }
        tracing::debug!(
            provider = %self.provider_id,
            streams = active.len(),
            "aborting in-flight streams"
        );
        for (handle, flag) in active.drain(..) {
            flag.store(true, Ordering::SeqCst);
            handle.abort();
        }
    }

    fn supports_streaming_with_tools(&self) -> bool {
        matches!(self.kind, ProviderKind::OpenAi | ProviderKind::Ollama)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_deltas_from_sse_lines() {
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        );
        assert_eq!(parse_sse_chunk(chunk), Some("Hello".to_string()));
    }

    #[test]
    fn done_sentinel_keeps_earlier_content() {
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}\n",
            "data: [DONE]\n",
        );
        assert_eq!(parse_sse_chunk(chunk), Some("end".to_string()));
        assert_eq!(parse_sse_chunk("data: [DONE]\n"), None);
    }

    #[test]
    fn ignores_non_data_lines_and_empty_deltas() {
        let chunk = concat!(
            ": keep-alive\n",
            "event: ping\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n",
        );
        assert_eq!(parse_sse_chunk(chunk), None);
    }

    #[test]
    fn streaming_with_tools_depends_on_backend_kind() {
        let openai = HttpChatClient::new(&Provider::new("openai", "OpenAI", ProviderKind::OpenAi));
        let router = HttpChatClient::new(&Provider::new(
            "openrouter",
            "OpenRouter",
            ProviderKind::OpenRouter,
        ));
        assert!(openai.supports_streaming_with_tools());
        assert!(!router.supports_streaming_with_tools());
    }

    #[test]
    fn request_payload_omits_unset_sampling_fields() {
        let request = ClientChatRequest::new("m1", vec![WireMessage::user("hi")]);
        let payload = ChatCompletionRequest::from_request(&request, false);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["model"], "m1");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
