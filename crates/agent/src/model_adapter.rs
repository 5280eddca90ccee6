//! Model adapter: the typed boundary between a provider's chunk stream and
//! the orchestrator.
//!
//! Chunks are consumed one at a time. Text is surfaced as it arrives; the
//! final chunk is validated once and classified as either a final answer or
//! a batch of tool-call requests. The orchestrator never inspects raw
//! provider output.

use threadloom_core::error::ProviderError;
use threadloom_core::message::MessageToolCall;
use threadloom_core::provider::StreamChunk;
use threadloom_core::tool::ToolCallRequest;
use tokio::sync::mpsc;

/// What one model response amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    FinalAnswer { text: String },

    /// The model wants tools run before it answers.
    ToolCalls {
        /// Any text streamed before the calls
        text: String,
        calls: Vec<ToolCallRequest>,
    },
}

/// One step of a model response as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    Delta(String),
    Finished(ModelOutput),
}

/// Incremental reader over a provider's chunk channel.
pub struct ModelStream {
    rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>,
    text: String,
    pending: Option<ModelOutput>,
    finished: bool,
}

impl ModelStream {
    pub fn new(rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>) -> Self {
        Self {
            rx,
            text: String::new(),
            pending: None,
            finished: false,
        }
    }

    /// The next event, or `None` once the response has been classified.
    ///
    /// A channel that closes before the final chunk is a
    /// [`ProviderError::StreamInterrupted`].
    pub async fn next(&mut self) -> Result<Option<ModelEvent>, ProviderError> {
        if let Some(output) = self.pending.take() {
            return Ok(Some(ModelEvent::Finished(output)));
        }
        if self.finished {
            return Ok(None);
        }

        loop {
            let chunk = match self.rx.recv().await {
                Some(chunk) => chunk?,
                None => {
                    self.finished = true;
                    return Err(ProviderError::StreamInterrupted(
                        "model stream ended before completion".into(),
                    ));
                }
            };

            let delta = chunk.content.filter(|c| !c.is_empty());
            if let Some(delta) = &delta {
                self.text.push_str(delta);
            }

            if chunk.done {
                self.finished = true;
                let output = classify(std::mem::take(&mut self.text), chunk.tool_calls)?;
                return Ok(Some(match delta {
                    Some(delta) => {
                        self.pending = Some(output);
                        ModelEvent::Delta(delta)
                    }
                    None => ModelEvent::Finished(output),
                }));
            }

            if let Some(delta) = delta {
                return Ok(Some(ModelEvent::Delta(delta)));
            }
        }
    }
}

/// Validate the wire-form tool calls of a finished response.
///
/// Tool names must be non-empty and arguments must be a JSON object (an
/// empty string counts as `{}`). Missing call ids are generated.
pub fn classify(text: String, tool_calls: Vec<MessageToolCall>) -> Result<ModelOutput, ProviderError> {
    if tool_calls.is_empty() {
        return Ok(ModelOutput::FinalAnswer { text });
    }

    let mut calls = Vec::with_capacity(tool_calls.len());
    for tc in tool_calls {
        let name = tc.name.trim();
        if name.is_empty() {
            return Err(ProviderError::Malformed("tool call without a name".into()));
        }

        let raw = tc.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                ProviderError::Malformed(format!("arguments for '{name}' are not JSON: {e}"))
            })?
        };
        if !arguments.is_object() {
            return Err(ProviderError::Malformed(format!(
                "arguments for '{name}' must be a JSON object"
            )));
        }

        let id = if tc.id.trim().is_empty() {
            new_call_id()
        } else {
            tc.id
        };

        calls.push(ToolCallRequest {
            id,
            name: name.to_string(),
            arguments,
        });
    }

    Ok(ModelOutput::ToolCalls { text, calls })
}

/// A fresh call identifier in the `call_<hex>` shape providers use.
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}
