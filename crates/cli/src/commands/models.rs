//! `threadloom models`: List models reachable through the configured providers.

use std::path::Path;

use super::{CmdResult, load_config};

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;
    let router = threadloom_providers::build_from_config(&config);

    println!("Default: {}/{}", config.default_provider, config.default_model);
    println!();
    for model in router.list_models().await {
        println!("  {model}");
    }
    Ok(())
}
