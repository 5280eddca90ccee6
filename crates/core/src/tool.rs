//! Tool trait, tool results, and the registry that dispatches them.
//!
//! Tools give the model the ability to act mid-turn: search the web,
//! fetch a page, run a snippet of code. The registry maps stable string
//! names to executors that share one invocation contract, and converts
//! every failure into a [`ToolResult`] so the orchestrator never has to
//! handle a tool error as control flow.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request, emitted by the model, to execute one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates this request to its result within one turn
    pub id: String,

    pub name: String,

    /// Structured key/value arguments
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    /// A short single-line rendering of the arguments for progress notices.
    pub fn args_summary(&self, max_chars: usize) -> String {
        let rendered = self.arguments.to_string();
        if rendered.chars().count() <= max_chars {
            return rendered;
        }
        let mut summary: String = rendered.chars().take(max_chars).collect();
        summary.push('…');
        summary
    }
}

/// What a tool hands back when it succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text fed back to the model
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// Machine-readable tool failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    ExecutionError,
    Timeout,
    UnreachableResource,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::InvalidArguments => "invalid_arguments",
            ToolErrorKind::ExecutionError => "execution_error",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::UnreachableResource => "unreachable_resource",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of executing one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    pub status: ToolStatus,

    /// Tool output on success, error summary on failure
    pub payload: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Success,
            payload: output.content,
            data: output.data,
            error_kind: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            status: ToolStatus::Failure,
            payload: error.to_string(),
            data: None,
            error_kind: Some(error.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// The core Tool trait.
///
/// Executors must be safe to retry: the orchestrator guarantees at most one
/// execution per call identifier, not the tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Tool descriptions for the model, ordered by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and run one call, bounded by `timeout`.
    ///
    /// Never fails: unknown names, bad arguments, executor errors, and
    /// timeouts all come back as a failed [`ToolResult`].
    pub async fn invoke(&self, call: &ToolCallRequest, timeout: Duration) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Unknown tool requested");
            return ToolResult::failure(&call.id, &ToolError::NotFound(call.name.clone()));
        };

        if let Err(reason) = validate_arguments(&tool.parameters_schema(), &call.arguments) {
            debug!(tool = %call.name, %reason, "Rejected tool arguments");
            return ToolResult::failure(&call.id, &ToolError::InvalidArguments(reason));
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, tool.execute(call.arguments.clone())).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                debug!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool succeeded");
                ToolResult::success(&call.id, output)
            }
            Ok(Err(e)) => {
                warn!(tool = %call.name, call_id = %call.id, elapsed_ms, error = %e, "Tool failed");
                ToolResult::failure(&call.id, &e)
            }
            Err(_) => {
                warn!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool timed out");
                ToolResult::failure(
                    &call.id,
                    &ToolError::Timeout {
                        tool_name: call.name.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    },
                )
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check `args` against the subset of JSON Schema our tools declare:
/// an object with `required` keys and primitive `type`s per property.
pub fn validate_arguments(
    schema: &serde_json::Value,
    args: &serde_json::Value,
) -> std::result::Result<(), String> {
    let Some(obj) = args.as_object() else {
        return Err(format!("arguments must be a JSON object, got {}", json_type(args)));
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            match obj.get(key) {
                None | Some(serde_json::Value::Null) => {
                    return Err(format!("missing required argument '{key}'"));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !type_matches(expected, value) {
                return Err(format!(
                    "argument '{key}' must be of type {expected}, got {}",
                    json_type(value)
                ));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
