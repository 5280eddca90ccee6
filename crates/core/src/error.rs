//! Error types for the threadloom domain.
//!
//! Each bounded context has its own `thiserror` enum; `Error` aggregates them.

use thiserror::Error;

use crate::tool::ToolErrorKind;

/// The top-level error type for all threadloom operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed model output: {0}")]
    Malformed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Thread is disabled: {0}")]
    ThreadDisabled(String),

    #[error("Thread {thread_id} is not owned by {requester}")]
    NotOwner { thread_id: String, requester: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Resource unreachable from {tool_name}: {reason}")]
    Unreachable { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },
}

impl ToolError {
    /// The machine-readable kind reported back to the model and the client.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::NotFound(_) => ToolErrorKind::UnknownTool,
            ToolError::InvalidArguments(_) | ToolError::PermissionDenied { .. } => {
                ToolErrorKind::InvalidArguments
            }
            ToolError::ExecutionFailed { .. } => ToolErrorKind::ExecutionError,
            ToolError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolError::Unreachable { .. } => ToolErrorKind::UnreachableResource,
        }
    }
}
