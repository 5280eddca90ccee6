//! SQLite thread store.
//!
//! Two tables:
//! - `threads`: one row per thread, soft-deleted via `disabled`
//! - `messages`: append-only, `(thread_id, ordinal)` unique
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so they sort
//! lexically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use threadloom_core::error::StoreError;
use threadloom_core::message::{Message, MessageToolCall, Role};
use threadloom_core::store::ThreadStore;
use threadloom_core::thread::{StoredMessage, Thread, ThreadId};
use tracing::{debug, info};

/// A SQLite-backed thread store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives only as long as its connection
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite thread store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id            TEXT PRIMARY KEY NOT NULL,
                owner_id      TEXT NOT NULL,
                title         TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                last_updated  TEXT NOT NULL,
                disabled      INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid           INTEGER PRIMARY KEY AUTOINCREMENT,
                id            TEXT UNIQUE NOT NULL,
                thread_id     TEXT NOT NULL REFERENCES threads(id),
                ordinal       INTEGER NOT NULL,
                role          TEXT NOT NULL,
                content       TEXT NOT NULL,
                tool_calls    TEXT NOT NULL DEFAULT '[]',
                tool_call_id  TEXT,
                tool_name     TEXT,
                created_by    TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                UNIQUE (thread_id, ordinal)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_threads_owner ON threads(owner_id, last_updated DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("owner index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> Result<Thread, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::Storage(format!("id column: {e}")))?;
        let owner_id: String = row
            .try_get("owner_id")
            .map_err(|e| StoreError::Storage(format!("owner_id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::Storage(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Storage(format!("created_at column: {e}")))?;
        let last_updated: String = row
            .try_get("last_updated")
            .map_err(|e| StoreError::Storage(format!("last_updated column: {e}")))?;
        let disabled: i64 = row
            .try_get("disabled")
            .map_err(|e| StoreError::Storage(format!("disabled column: {e}")))?;

        Ok(Thread {
            id: ThreadId(id),
            owner_id,
            title,
            created_at: parse_timestamp(&created_at)?,
            last_updated: parse_timestamp(&last_updated)?,
            disabled: disabled != 0,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::Storage(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let thread_id: String = row.try_get("thread_id").map_err(|e| column("thread_id", e))?;
        let ordinal: i64 = row.try_get("ordinal").map_err(|e| column("ordinal", e))?;
        let role: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let tool_calls: String = row.try_get("tool_calls").map_err(|e| column("tool_calls", e))?;
        let tool_call_id: Option<String> =
            row.try_get("tool_call_id").map_err(|e| column("tool_call_id", e))?;
        let tool_name: Option<String> =
            row.try_get("tool_name").map_err(|e| column("tool_name", e))?;
        let created_by: String = row.try_get("created_by").map_err(|e| column("created_by", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;

        let role = Role::from_str(&role).map_err(StoreError::Storage)?;
        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls)
            .map_err(|e| StoreError::Storage(format!("tool_calls json: {e}")))?;

        Ok(StoredMessage {
            thread_id: ThreadId(thread_id),
            ordinal: ordinal as u64,
            created_by,
            message: Message {
                id,
                role,
                content,
                tool_calls,
                tool_call_id,
                tool_name,
                created_at: parse_timestamp(&created_at)?,
            },
        })
    }

    async fn fetch_thread<'e, E>(executor: E, thread_id: &ThreadId) -> Result<Thread, StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?")
            .bind(thread_id.as_str())
            .fetch_optional(executor)
            .await
            .map_err(|e| StoreError::Storage(format!("Thread lookup failed: {e}")))?
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        Self::row_to_thread(&row)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("Bad timestamp '{s}': {e}")))
}

#[async_trait]
impl ThreadStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_thread(&self, owner_id: &str) -> Result<Thread, StoreError> {
        let thread = Thread::new(owner_id);
        sqlx::query(
            "INSERT INTO threads (id, owner_id, title, created_at, last_updated, disabled) \
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(thread.id.as_str())
        .bind(&thread.owner_id)
        .bind(&thread.title)
        .bind(thread.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .bind(thread.last_updated.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Create thread failed: {e}")))?;

        debug!(thread_id = %thread.id, owner = %thread.owner_id, "Thread created");
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: &ThreadId) -> Result<Thread, StoreError> {
        Self::fetch_thread(&self.pool, thread_id).await
    }

    async fn list_threads(&self, owner_id: &str) -> Result<Vec<Thread>, StoreError> {
        let rows = sqlx::query("SELECT * FROM threads WHERE owner_id = ? ORDER BY last_updated DESC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("List threads failed: {e}")))?;
        rows.iter().map(Self::row_to_thread).collect()
    }

    async fn append_message(
        &self,
        thread_id: &ThreadId,
        message: Message,
    ) -> Result<StoredMessage, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin failed: {e}")))?;

        let thread = Self::fetch_thread(&mut *tx, thread_id).await?;
        if thread.disabled {
            return Err(StoreError::ThreadDisabled(thread_id.to_string()));
        }

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(ordinal), 0) + 1 FROM messages WHERE thread_id = ?",
        )
        .bind(thread_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Ordinal lookup failed: {e}")))?;

        let stored = StoredMessage::new(&thread, next as u64, message);
        let tool_calls = serde_json::to_string(&stored.message.tool_calls)
            .map_err(|e| StoreError::Storage(format!("tool_calls json: {e}")))?;

        sqlx::query(
            "INSERT INTO messages (id, thread_id, ordinal, role, content, tool_calls, \
             tool_call_id, tool_name, created_by, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&stored.message.id)
        .bind(thread_id.as_str())
        .bind(next)
        .bind(stored.message.role.as_str())
        .bind(&stored.message.content)
        .bind(tool_calls)
        .bind(&stored.message.tool_call_id)
        .bind(&stored.message.tool_name)
        .bind(&stored.created_by)
        .bind(stored.message.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Insert message failed: {e}")))?;

        sqlx::query("UPDATE threads SET last_updated = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true))
            .bind(thread_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Touch thread failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        debug!(thread_id = %thread_id, ordinal = next, role = %stored.message.role, "Message appended");
        Ok(stored)
    }

    async fn list_messages(&self, thread_id: &ThreadId) -> Result<Vec<StoredMessage>, StoreError> {
        // Distinguish "no such thread" from "empty thread"
        Self::fetch_thread(&self.pool, thread_id).await?;

        let rows = sqlx::query("SELECT * FROM messages WHERE thread_id = ? ORDER BY ordinal ASC")
            .bind(thread_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("List messages failed: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn rename_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
        title: &str,
    ) -> Result<Thread, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin failed: {e}")))?;

        let mut thread = Self::fetch_thread(&mut *tx, thread_id).await?;
        if !thread.is_owned_by(requester) {
            return Err(StoreError::NotOwner {
                thread_id: thread_id.to_string(),
                requester: requester.to_string(),
            });
        }
        if thread.disabled {
            return Err(StoreError::ThreadDisabled(thread_id.to_string()));
        }

        let now = Utc::now();
        sqlx::query("UPDATE threads SET title = ?, last_updated = ? WHERE id = ?")
            .bind(title)
            .bind(now.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .bind(thread_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Rename thread failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        thread.title = title.to_string();
        thread.last_updated = now;
        debug!(thread_id = %thread_id, "Thread renamed");
        Ok(thread)
    }

    async fn disable_thread(
        &self,
        thread_id: &ThreadId,
        requester: &str,
    ) -> Result<Thread, StoreError> {
        let mut thread = Self::fetch_thread(&self.pool, thread_id).await?;
        if !thread.is_owned_by(requester) {
            return Err(StoreError::NotOwner {
                thread_id: thread_id.to_string(),
                requester: requester.to_string(),
            });
        }

        sqlx::query("UPDATE threads SET disabled = 1 WHERE id = ?")
            .bind(thread_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Disable thread failed: {e}")))?;

        thread.disabled = true;
        Ok(thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_thread() {
        let store = test_store().await;
        let thread = store.create_thread("alice").await.unwrap();
        let fetched = store.get_thread(&thread.id).await.unwrap();
        assert_eq!(fetched.id, thread.id);
        assert_eq!(fetched.owner_id, "alice");
        assert_eq!(fetched.title, thread.title);
        assert!(!fetched.disabled);
    }

    #[tokio::test]
    async fn messages_roundtrip_in_order() {
        let store = test_store().await;
        let thread = store.create_thread("alice").await.unwrap();

        store.append_message(&thread.id, Message::user("weather?")).await.unwrap();
        store
            .append_message(
                &thread.id,
                Message::assistant_tool_calls(
                    "",
                    vec![MessageToolCall {
                        id: "call_1".into(),
                        name: "web_search".into(),
                        arguments: r#"{"query":"weather today"}"#.into(),
                    }],
                ),
            )
            .await
            .unwrap();
        store
            .append_message(&thread.id, Message::tool_result("call_1", "web_search", "sunny"))
            .await
            .unwrap();
        store.append_message(&thread.id, Message::assistant("It is sunny.")).await.unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        let roles: Vec<Role> = messages.iter().map(|m| m.message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(messages.iter().map(|m| m.ordinal).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(messages[1].message.tool_calls[0].name, "web_search");
        assert_eq!(messages[2].message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[2].message.tool_name.as_deref(), Some("web_search"));
        assert_eq!(messages[0].created_by, "alice");
    }

    #[tokio::test]
    async fn empty_thread_lists_no_messages() {
        let store = test_store().await;
        let thread = store.create_thread("alice").await.unwrap();
        assert!(store.list_messages(&thread.id).await.unwrap().is_empty());
        assert!(matches!(
            store.list_messages(&ThreadId::from("missing")).await,
            Err(StoreError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn disable_is_owner_only_and_terminal() {
        let store = test_store().await;
        let thread = store.create_thread("alice").await.unwrap();

        assert!(matches!(
            store.disable_thread(&thread.id, "bob").await,
            Err(StoreError::NotOwner { .. })
        ));

        store.disable_thread(&thread.id, "alice").await.unwrap();
        assert!(store.get_thread(&thread.id).await.unwrap().disabled);
        assert!(matches!(
            store.append_message(&thread.id, Message::user("again")).await,
            Err(StoreError::ThreadDisabled(_))
        ));
    }

    #[tokio::test]
    async fn rename_persists_title_for_owner_only() {
        let store = test_store().await;
        let thread = store.create_thread("alice").await.unwrap();

        assert!(matches!(
            store.rename_thread(&thread.id, "bob", "stolen").await,
            Err(StoreError::NotOwner { .. })
        ));
        assert_eq!(store.get_thread(&thread.id).await.unwrap().title, thread.title);

        store.rename_thread(&thread.id, "alice", "Weekend plans").await.unwrap();
        let fetched = store.get_thread(&thread.id).await.unwrap();
        assert_eq!(fetched.title, "Weekend plans");
        assert!(fetched.last_updated >= thread.last_updated);

        store.disable_thread(&thread.id, "alice").await.unwrap();
        assert!(matches!(
            store.rename_thread(&thread.id, "alice", "too late").await,
            Err(StoreError::ThreadDisabled(_))
        ));
    }

    #[tokio::test]
    async fn list_threads_newest_first() {
        let store = test_store().await;
        let first = store.create_thread("alice").await.unwrap();
        let second = store.create_thread("alice").await.unwrap();
        store.create_thread("bob").await.unwrap();
        store.append_message(&first.id, Message::user("bump")).await.unwrap();

        let threads = store.list_threads("alice").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, first.id);
        assert_eq!(threads[1].id, second.id);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("threads.db").display());

        let thread_id = {
            let store = SqliteStore::new(&path).await.unwrap();
            let thread = store.create_thread("alice").await.unwrap();
            store.append_message(&thread.id, Message::user("remember me")).await.unwrap();
            thread.id
        };

        let reopened = SqliteStore::new(&path).await.unwrap();
        let messages = reopened.list_messages(&thread_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.content, "remember me");
    }
}
