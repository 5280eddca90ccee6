//! Scripted provider: replays canned model responses.
//!
//! Each call to `stream()` or `complete()` consumes the next script. Used by
//! the test suites across the workspace and for offline demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use threadloom_core::error::ProviderError;
use threadloom_core::message::{Message, MessageToolCall};
use threadloom_core::provider::*;

/// One step of a scripted model response.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream a text fragment
    Text(String),
    /// Request a tool; delivered with the final chunk
    ToolCall(MessageToolCall),
    /// Refuse the request before any chunk is produced
    Fail(ProviderError),
    /// Break the stream mid-way
    StreamError(ProviderError),
    /// Pause before the next step
    Delay(Duration),
    /// Never finish; ends only when the consumer goes away
    Stall,
}

impl ScriptStep {
    pub fn text(s: impl Into<String>) -> Self {
        ScriptStep::Text(s.into())
    }

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        ScriptStep::ToolCall(MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        })
    }
}

/// A provider that replays one script per request, in order.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    models: Vec<String>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            models: vec!["scripted-1".into()],
        }
    }

    /// A provider that answers once with `text`.
    pub fn text(text: &str) -> Self {
        Self::new(vec![vec![ScriptStep::text(text)]])
    }

    /// How many requests have been made.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_script(&self, request: ProviderRequest) -> Result<Vec<ScriptStep>, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .ok_or_else(|| ProviderError::NotConfigured("scripted provider exhausted".into()))?;

        if let Some(ScriptStep::Fail(e)) = script.first() {
            return Err(e.clone());
        }
        Ok(script)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let script = self.next_script(request)?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for step in script {
            match step {
                ScriptStep::Text(t) => content.push_str(&t),
                ScriptStep::ToolCall(tc) => tool_calls.push(tc),
                ScriptStep::Fail(e) | ScriptStep::StreamError(e) => return Err(e),
                ScriptStep::Delay(d) => tokio::time::sleep(d).await,
                ScriptStep::Stall => {}
            }
        }

        Ok(ProviderResponse {
            message: Message::assistant_tool_calls(content, tool_calls),
            usage: None,
            model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>
    {
        let script = self.next_script(request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        tokio::spawn(async move {
            let mut tool_calls = Vec::new();
            for step in script {
                match step {
                    ScriptStep::Text(t) => {
                        if tx.send(Ok(StreamChunk::text(t))).await.is_err() {
                            return;
                        }
                    }
                    ScriptStep::ToolCall(tc) => tool_calls.push(tc),
                    ScriptStep::Fail(e) | ScriptStep::StreamError(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    ScriptStep::Delay(d) => tokio::time::sleep(d).await,
                    ScriptStep::Stall => {
                        tx.closed().await;
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(StreamChunk::finished(tool_calls))).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.models.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "scripted-1".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
            stream: true,
        }
    }

    #[tokio::test]
    async fn streams_text_then_tool_calls() {
        let provider = ScriptedProvider::new(vec![vec![
            ScriptStep::text("Let me check. "),
            ScriptStep::tool_call("call_1", "web_search", serde_json::json!({"query": "weather today"})),
        ]]);

        let mut rx = provider.stream(request()).await.unwrap();
        let text = rx.recv().await.unwrap().unwrap();
        assert_eq!(text.content.as_deref(), Some("Let me check. "));
        let done = rx.recv().await.unwrap().unwrap();
        assert!(done.done);
        assert_eq!(done.tool_calls[0].name, "web_search");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn fail_step_rejects_request() {
        let provider = ScriptedProvider::new(vec![vec![ScriptStep::Fail(ProviderError::Network(
            "down".into(),
        ))]]);
        assert!(matches!(
            provider.stream(request()).await,
            Err(ProviderError::Network(_))
        ));
    }

    #[tokio::test]
    async fn exhausted_script_is_an_error() {
        let provider = ScriptedProvider::new(vec![]);
        assert!(provider.complete(request()).await.is_err());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn complete_concatenates_text() {
        let provider =
            ScriptedProvider::new(vec![vec![ScriptStep::text("2+2"), ScriptStep::text("=4")]]);
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(response.message.content, "2+2=4");
    }
}
