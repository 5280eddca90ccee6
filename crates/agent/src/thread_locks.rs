//! Per-thread turn serialization.
//!
//! Two turns on the same thread must not interleave their messages, so each
//! turn holds its thread's lock from the first append to the last. Turns on
//! different threads never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use threadloom_core::thread::ThreadId;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `thread_id`. Released when the guard drops.
    pub async fn acquire(&self, thread_id: &ThreadId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map are idle
            locks.retain(|id, lock| id == thread_id || Arc::strong_count(lock) > 1);
            locks.entry(thread_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Threads with a turn running or waiting.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.values().filter(|l| Arc::strong_count(l) > 1).count())
            .unwrap_or_default()
    }
}
