//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, llama.cpp, Together AI,
//! and any other endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling, with tool-call deltas reassembled by index
//! - Model listing and health checks

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use threadloom_core::error::ProviderError;
use threadloom_core::message::{Message, MessageToolCall, Role};
use threadloom_core::provider::*;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible language-model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Fails only if the HTTP client (TLS backend, timeouts) cannot be built.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("{name}: cannot build HTTP client: {e}"))
            })?;

        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn post_chat(
        &self,
        body: &serde_json::Value,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            429 => Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            }),
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            404 => Err(ProviderError::ModelNotFound(
                body["model"].as_str().unwrap_or_default().to_string(),
            )),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                })
            }
        }
    }
}

#[async_trait]
impl threadloom_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, "Sending completion request");
        let body = Self::request_body(&request, false);
        let response = self.post_chat(&body, "application/json").await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::Malformed(format!(
                "Failed to parse response: {e}"
            )))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
            tool_name: None,
            created_at: chrono::Utc::now(),
        };

        Ok(ProviderResponse {
            message,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        debug!(provider = %self.name, model = %request.model, "Sending streaming request");
        let body = Self::request_body(&request, true);
        let response = self.post_chat(&body, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let provider_name = self.name.clone();

        // Read the SSE byte stream; stops early once the receiver is dropped
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut state = StreamState::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    if data == "[DONE]" {
                        let _ = tx.send(Ok(state.finish(None))).await;
                        return;
                    }

                    let stream_resp = match serde_json::from_str::<StreamResponse>(&data) {
                        Ok(r) => r,
                        Err(e) => {
                            trace!(provider = %provider_name, data = %data, error = %e, "Ignoring unparseable SSE chunk");
                            continue;
                        }
                    };

                    if let Some(usage) = stream_resp.usage {
                        state.absorb(&stream_resp.choices);
                        let _ = tx.send(Ok(state.finish(Some(usage.into())))).await;
                        return;
                    }

                    if let Some(chunk) = state.absorb(&stream_resp.choices)
                        && tx.send(Ok(chunk)).await.is_err()
                    {
                        return;
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(state.finish(None))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Buffers raw bytes so a multi-byte character split across network
/// chunks is decoded only once its line is complete.
#[derive(Default)]
struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip blank separators and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim().to_string());
            }
        }
        payloads
    }
}

/// Tool-call deltas accumulated across one streamed response.
#[derive(Default)]
struct StreamState {
    accumulators: BTreeMap<u32, ToolCallAccumulator>,
}

impl StreamState {
    /// Fold one SSE chunk in; returns a text chunk to forward, if any.
    fn absorb(&mut self, choices: &[StreamChoice]) -> Option<StreamChunk> {
        let choice = choices.first()?;
        let delta = &choice.delta;

        if let Some(tc_deltas) = &delta.tool_calls {
            for tc_delta in tc_deltas {
                let acc = self.accumulators.entry(tc_delta.index).or_default();
                if let Some(id) = &tc_delta.id {
                    acc.id = id.clone();
                }
                if let Some(func) = &tc_delta.function {
                    if let Some(name) = &func.name {
                        acc.name = name.clone();
                    }
                    if let Some(args) = &func.arguments {
                        acc.arguments.push_str(args);
                    }
                }
            }
        }

        delta
            .content
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|c| StreamChunk::text(c.clone()))
    }

    /// The terminal chunk, carrying every accumulated tool call in index order.
    fn finish(&mut self, usage: Option<Usage>) -> StreamChunk {
        let tool_calls = std::mem::take(&mut self.accumulators)
            .into_values()
            .map(|acc| acc.to_tool_call())
            .collect();
        StreamChunk {
            usage,
            ..StreamChunk::finished(tool_calls)
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, which arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_tool_call(&self) -> MessageToolCall {
        MessageToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadloom_core::Provider;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve one canned HTTP response on a local port and return its base URL.
    async fn serve_once(status_line: &'static str, content_type: &'static str, body: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/v1")
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("What is 2+2?")],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
            stream: true,
        }
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_tool_calls(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "web_search".into(),
                arguments: r#"{"query":"weather today"}"#.into(),
            }],
        );
        let api_msgs =
            OpenAiCompatProvider::to_api_messages(&[Message::system("sys"), msg, Message::tool_result("call_1", "web_search", "sunny")]);
        assert_eq!(api_msgs[0].role, "system");
        let tc = api_msgs[1].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "web_search");
        assert_eq!(api_msgs[2].role, "tool");
        assert_eq!(api_msgs[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_includes_tools_when_present() {
        let mut req = request();
        req.tools = vec![ToolDefinition {
            name: "web_search".into(),
            description: "Search".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let body = OpenAiCompatProvider::request_body(&req, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(body["stream_options"]["include_usage"], true);

        let plain = OpenAiCompatProvider::request_body(&request(), false);
        assert!(plain.get("tools").is_none());
        assert!(plain.get("stream_options").is_none());
    }

    #[test]
    fn line_buffer_handles_split_frames() {
        let mut lines = SseLineBuffer::default();
        assert!(lines.push(b"data: {\"a\"").is_empty());
        let out = lines.push(b":1}\n\n: keepalive\ndata: [DONE]\n");
        assert_eq!(out, vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_intact() {
        let mut lines = SseLineBuffer::default();
        let text = "data: {\"c\":\"é\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(lines.push(&text[..split]).is_empty());
        let out = lines.push(&text[split..]);
        assert_eq!(out, vec!["{\"c\":\"é\"}".to_string()]);
    }

    #[test]
    fn stream_state_assembles_tool_calls_in_index_order() {
        let mut state = StreamState::default();
        let chunks = [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"url_fetch","arguments":""}},{"index":0,"id":"call_a","function":{"name":"web_search","arguments":"{\"query\""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":": \"rust\"}"}}]}}]}"#,
        ];
        for data in chunks {
            let resp: StreamResponse = serde_json::from_str(data).unwrap();
            assert!(state.absorb(&resp.choices).is_none());
        }
        let done = state.finish(None);
        assert!(done.done);
        assert_eq!(done.tool_calls.len(), 2);
        assert_eq!(done.tool_calls[0].id, "call_a");
        assert_eq!(done.tool_calls[0].arguments, r#"{"query": "rust"}"#);
        assert_eq!(done.tool_calls[1].name, "url_fetch");
    }

    #[test]
    fn stream_state_forwards_text() {
        let mut state = StreamState::default();
        let resp: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#).unwrap();
        assert_eq!(state.absorb(&resp.choices).unwrap().content.as_deref(), Some("Hel"));
        let empty: StreamResponse =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert!(state.absorb(&empty.choices).is_none());
    }

    #[tokio::test]
    async fn stream_against_local_server() {
        let body = [
            r#"data: {"choices":[{"delta":{"content":"4"},"finish_reason":null}]}"#,
            "",
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            "",
            "data: [DONE]",
            "",
            "",
        ]
        .join("\n");
        let base = serve_once("200 OK", "text/event-stream", body).await;
        let provider = OpenAiCompatProvider::new("local", base, "sk-test").unwrap();

        let mut rx = provider.stream(request()).await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("4"));
        let last = rx.recv().await.unwrap().unwrap();
        assert!(last.done);
        assert!(last.tool_calls.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn complete_against_local_server() {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "4"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        })
        .to_string();
        let base = serve_once("200 OK", "application/json", body).await;
        let provider = OpenAiCompatProvider::new("local", base, "sk-test").unwrap();

        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.message.content, "4");
        assert_eq!(response.usage.unwrap().total_tokens, 4);
    }

    #[tokio::test]
    async fn auth_failure_is_reported() {
        let base = serve_once("401 Unauthorized", "application/json", "{}".into()).await;
        let provider = OpenAiCompatProvider::new("local", base, "bad").unwrap();
        let err = provider.stream(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = OpenAiCompatProvider::new("local", "http://127.0.0.1:1/v1", "sk").unwrap();
        let err = provider.stream(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
