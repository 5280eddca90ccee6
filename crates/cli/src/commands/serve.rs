//! `threadloom serve`: Start the HTTP API server.

use std::path::Path;

use super::{CmdResult, load_config, open_store};

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> CmdResult {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("threadloom gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!("   Auth:      {} bearer token(s)", config.gateway.bearer_tokens.len());

    let store = open_store(&config).await?;
    threadloom_gateway::start(config, store).await?;

    Ok(())
}
