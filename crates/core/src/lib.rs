//! # threadloom core
//!
//! Domain types, traits, and error definitions for the threadloom
//! conversational-inference backend. Everything else in the workspace
//! depends inward on this crate.
//!
//! - `message` / `thread`: the persisted conversation model
//! - `provider`: the language-model boundary
//! - `tool`: tool contract, results, and the registry
//! - `store`: the thread/message persistence contract
//! - `event`: domain events for observers

pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod provider;
pub mod store;
pub mod thread;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use identity::Identity;
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use store::ThreadStore;
pub use thread::{StoredMessage, Thread, ThreadId};
pub use tool::{
    Tool, ToolCallRequest, ToolErrorKind, ToolOutput, ToolRegistry, ToolResult, ToolStatus,
};
