//! Thread and stored-message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;

/// Opaque unique key of a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted conversation between an owner and the system.
///
/// Threads are soft-deleted only: once `disabled` is set, no further
/// messages are accepted, and the flag is never cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Bumped by every appended message
    pub last_updated: DateTime<Utc>,
    pub disabled: bool,
}

impl Thread {
    /// A fresh thread titled with its creation timestamp.
    pub fn new(owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            owner_id: owner_id.into(),
            title: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            created_at: now,
            last_updated: now,
            disabled: false,
        }
    }

    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.owner_id == subject
    }
}

/// A message as recorded by a store, with its position in the thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub thread_id: ThreadId,
    /// 1-based, dense, strictly increasing within a thread
    pub ordinal: u64,
    /// Owner id for user messages, the role name otherwise
    pub created_by: String,
    #[serde(flatten)]
    pub message: Message,
}

impl StoredMessage {
    pub fn new(thread: &Thread, ordinal: u64, message: Message) -> Self {
        let created_by = match message.role {
            crate::message::Role::User => thread.owner_id.clone(),
            other => other.as_str().to_string(),
        };
        Self {
            thread_id: thread.id.clone(),
            ordinal,
            created_by,
            message,
        }
    }
}
