//! Caller identity.
//!
//! Authentication happens outside the core; by the time a request reaches
//! the orchestrator it carries an already-validated, opaque subject.

use serde::{Deserialize, Serialize};

/// Subject used when no authentication is configured.
pub const LOCAL_SUBJECT: &str = "local";

/// A validated caller, as resolved by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    /// The identity every caller gets on an unauthenticated deployment.
    pub fn local() -> Self {
        Self::new(LOCAL_SUBJECT)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.subject)
    }
}
