//! `threadloom tools`: List the tools a turn may call.

use std::path::Path;

use super::{CmdResult, load_config};

pub async fn run(config_path: Option<&Path>) -> CmdResult {
    let config = load_config(config_path)?;
    let registry = threadloom_tools::default_registry(&config.tools)?;

    println!("Tools ({} enabled, {}s timeout)", registry.len(), config.tools.timeout_secs);
    println!();
    for tool in registry.list_tools() {
        println!("  {}", tool.name);
        println!("    {}", tool.description);
        if let Some(props) = tool.parameters["properties"].as_object() {
            let params: Vec<&str> = props.keys().map(String::as_str).collect();
            println!("    params: {}", params.join(", "));
        }
    }
    Ok(())
}
