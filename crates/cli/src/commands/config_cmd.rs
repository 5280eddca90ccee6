//! `threadloom config`: Configuration inspection commands.

use std::path::Path;

use threadloom_config::AppConfig;

use super::{CmdResult, load_config};

/// The effective configuration as TOML, with secrets masked.
fn render(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("[REDACTED]".into());
    }
    for provider in shown.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    shown.gateway.bearer_tokens = shown
        .gateway
        .bearer_tokens
        .into_values()
        .enumerate()
        .map(|(i, owner)| (format!("token-{}", i + 1), owner))
        .collect();
    toml::to_string_pretty(&shown)
}

pub async fn show(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;
    println!("{}", render(&config)?);
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> CmdResult {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    println!("{}", path.display());
    Ok(())
}

pub async fn defaults() -> CmdResult {
    println!("{}", AppConfig::default_toml());
    Ok(())
}
