//! ThreadStore trait: durable, append-only thread and message persistence.
//!
//! Implementations: SQLite and in-memory (see `threadloom-store`).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;
use crate::thread::{StoredMessage, Thread, ThreadId};

/// The core persistence contract consumed by the orchestrator and gateway.
///
/// Appends are totally ordered per thread: a concurrent `list_messages`
/// always observes some prefix of the append sequence.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Create an empty, active thread owned by `owner_id`.
    async fn create_thread(&self, owner_id: &str) -> std::result::Result<Thread, StoreError>;

    async fn get_thread(&self, thread_id: &ThreadId) -> std::result::Result<Thread, StoreError>;

    /// All threads of one owner, most recently updated first.
    async fn list_threads(&self, owner_id: &str) -> std::result::Result<Vec<Thread>, StoreError>;

    /// Append one message and bump the thread's `last_updated`.
    ///
    /// Fails with [`StoreError::ThreadDisabled`] once the thread is disabled.
    async fn append_message(
        &self,
        thread_id: &ThreadId,
        message: Message,
    ) -> std::result::Result<StoredMessage, StoreError>;

    /// Messages in append order.
    async fn list_messages(
        &self,
        thread_id: &ThreadId,
    ) -> std::result::Result<Vec<StoredMessage>, StoreError>;

    /// Retitle a thread and bump its `last_updated`. Owner only; disabled
    /// threads are read-only.
    async fn rename_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
        title: &str,
    ) -> std::result::Result<Thread, StoreError>;

    /// Soft-delete a thread. Only its owner may do this; repeating it is a no-op.
    async fn disable_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
    ) -> std::result::Result<Thread, StoreError>;
}
