pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod serve;
pub mod threads;
pub mod tools;

use std::path::Path;
use std::sync::Arc;

use threadloom_config::AppConfig;
use threadloom_core::error::StoreError;
use threadloom_core::store::ThreadStore;
use threadloom_store::{InMemoryStore, SqliteStore};
use tracing::info;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the configured thread store.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ThreadStore>, StoreError> {
    match config.store.backend.as_str() {
        "memory" => {
            info!("Using in-memory thread store; threads are lost on exit");
            Ok(Arc::new(InMemoryStore::new()))
        }
        _ => {
            let path = config.store.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteStore::new(&url).await?))
        }
    }
}
