//! In-memory store: useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use threadloom_core::error::StoreError;
use threadloom_core::message::Message;
use threadloom_core::store::ThreadStore;
use threadloom_core::thread::{StoredMessage, Thread, ThreadId};
use tokio::sync::RwLock;

struct ThreadRecord {
    thread: Thread,
    messages: Vec<StoredMessage>,
}

/// A store that keeps every thread in a map behind one lock.
///
/// Appends take the write lock, so ordinals are assigned without gaps and
/// readers always see a whole prefix.
pub struct InMemoryStore {
    threads: Arc<RwLock<HashMap<ThreadId, ThreadRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThreadStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_thread(&self, owner_id: &str) -> Result<Thread, StoreError> {
        let thread = Thread::new(owner_id);
        self.threads.write().await.insert(
            thread.id.clone(),
            ThreadRecord {
                thread: thread.clone(),
                messages: Vec::new(),
            },
        );
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &ThreadId) -> Result<Thread, StoreError> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .map(|r| r.thread.clone())
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))
    }

    async fn list_threads(&self, owner_id: &str) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.read().await;
        let mut owned: Vec<Thread> = threads
            .values()
            .filter(|r| r.thread.owner_id == owner_id)
            .map(|r| r.thread.clone())
            .collect();
        owned.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(owned)
    }

    async fn append_message(
        &self,
        thread_id: &ThreadId,
        message: Message,
    ) -> Result<StoredMessage, StoreError> {
        let mut threads = self.threads.write().await;
        let record = threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        if record.thread.disabled {
            return Err(StoreError::ThreadDisabled(thread_id.to_string()));
        }

        let ordinal = record.messages.len() as u64 + 1;
        let stored = StoredMessage::new(&record.thread, ordinal, message);
        record.thread.last_updated = Utc::now();
        record.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, StoreError> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .map(|r| r.messages.clone())
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))
    }

    async fn rename_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
        title: &str,
    ) -> Result<Thread, StoreError> {
        let mut threads = self.threads.write().await;
        let record = threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        if !record.thread.is_owned_by(requester) {
            return Err(StoreError::NotOwner {
                thread_id: thread_id.to_string(),
                requester: requester.to_string(),
            });
        }
        if record.thread.disabled {
            return Err(StoreError::ThreadDisabled(thread_id.to_string()));
        }
        record.thread.title = title.to_string();
        record.thread.last_updated = Utc::now();
        Ok(record.thread.clone())
    }

    async fn disable_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
    ) -> Result<Thread, StoreError> {
        let mut threads = self.threads.write().await;
        let record = threads
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        if !record.thread.is_owned_by(requester) {
            return Err(StoreError::NotOwner {
                thread_id: thread_id.to_string(),
                requester: requester.to_string(),
            });
        }
        record.thread.disabled = true;
        Ok(record.thread.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadloom_core::message::Role;

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryStore::new();
        let thread = store.create_thread("alice").await.unwrap();
        let fetched = store.get_thread(&thread.id).await.unwrap();
        assert_eq!(fetched, thread);
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn append_assigns_dense_ordinals() {
        let store = InMemoryStore::new();
        let thread = store.create_thread("alice").await.unwrap();
        store.append_message(&thread.id, Message::user("hi")).await.unwrap();
        store.append_message(&thread.id, Message::assistant("hello")).await.unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        let ordinals: Vec<u64> = messages.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2]);
        assert_eq!(messages[0].message.role, Role::User);
        assert_eq!(messages[0].created_by, "alice");
        assert_eq!(messages[1].created_by, "assistant");

        let updated = store.get_thread(&thread.id).await.unwrap();
        assert!(updated.last_updated >= thread.last_updated);
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let store = InMemoryStore::new();
        let missing = ThreadId::from("nope");
        assert!(matches!(
            store.get_thread(&missing).await,
            Err(StoreError::ThreadNotFound(_))
        ));
        assert!(matches!(
            store.append_message(&missing, Message::user("x")).await,
            Err(StoreError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn disabled_thread_rejects_appends() {
        let store = InMemoryStore::new();
        let thread = store.create_thread("alice").await.unwrap();
        let disabled = store.disable_thread(&thread.id, "alice").await.unwrap();
        assert!(disabled.disabled);

        let err = store.append_message(&thread.id, Message::user("late")).await.unwrap_err();
        assert!(matches!(err, StoreError::ThreadDisabled(_)));
        // Disabling again is a no-op
        assert!(store.disable_thread(&thread.id, "alice").await.is_ok());
    }

    #[tokio::test]
    async fn rename_is_owner_only_and_refreshes_thread() {
        let store = InMemoryStore::new();
        let thread = store.create_thread("alice").await.unwrap();

        let err = store.rename_thread(&thread.id, "bob", "mine now").await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner { .. }));

        let renamed = store.rename_thread(&thread.id, "alice", "Trip plans").await.unwrap();
        assert_eq!(renamed.title, "Trip plans");
        assert!(renamed.last_updated >= thread.last_updated);
        assert_eq!(store.get_thread(&thread.id).await.unwrap().title, "Trip plans");

        store.disable_thread(&thread.id, "alice").await.unwrap();
        let err = store.rename_thread(&thread.id, "alice", "again").await.unwrap_err();
        assert!(matches!(err, StoreError::ThreadDisabled(_)));
    }

    #[tokio::test]
    async fn only_owner_can_disable() {
        let store = InMemoryStore::new();
        let thread = store.create_thread("alice").await.unwrap();
        let err = store.disable_thread(&thread.id, "bob").await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwner { .. }));
        assert!(!store.get_thread(&thread.id).await.unwrap().disabled);
    }

    #[tokio::test]
    async fn list_threads_filters_by_owner() {
        let store = InMemoryStore::new();
        let a1 = store.create_thread("alice").await.unwrap();
        let _b = store.create_thread("bob").await.unwrap();
        let a2 = store.create_thread("alice").await.unwrap();
        store.append_message(&a1.id, Message::user("bump")).await.unwrap();

        let threads = store.list_threads("alice").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, a1.id);
        assert_eq!(threads[1].id, a2.id);
    }
}
