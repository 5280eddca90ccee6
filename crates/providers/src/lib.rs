//! Language-model provider implementations for threadloom.
//!
//! All providers implement the `threadloom_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;
pub mod scripted;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
pub use scripted::{ScriptStep, ScriptedProvider};
