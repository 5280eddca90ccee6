//! Built-in tool executors for threadloom.
//!
//! - `web_search`: ranked snippets from a DuckDuckGo-compatible endpoint
//! - `url_fetch`: size-capped page text, guarded against internal targets
//! - `code_exec`: one-shot interpreter runs in a throwaway directory

pub mod code_exec;
pub mod confine;
pub mod url_fetch;
pub mod url_policy;
pub mod web_search;

#[cfg(test)]
mod test_server;

use std::path::PathBuf;
use std::time::Duration;

use threadloom_config::ToolsConfig;
use threadloom_core::error::ToolError;
use threadloom_core::tool::Tool;
use tracing::{debug, warn};

pub use threadloom_core::tool::ToolRegistry;

pub use code_exec::CodeExecTool;
pub use url_fetch::UrlFetchTool;
pub use url_policy::UrlPolicy;
pub use web_search::WebSearchTool;

const USER_AGENT: &str = concat!("threadloom/", env!("CARGO_PKG_VERSION"));

/// Build the registry from configuration, registering only enabled tools.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for name in &config.enabled {
        let tool: Option<Box<dyn Tool>> = match name.as_str() {
            "web_search" => Some(Box::new(WebSearchTool::new(
                &config.search_endpoint,
                config.search_max_results,
            )?)),
            "url_fetch" => Some(Box::new(UrlFetchTool::new(
                UrlPolicy::new(config.fetch_allowed_endpoints.clone(), config.fetch_allow_private),
                config.fetch_max_bytes,
            )?)),
            "code_exec" => Some(Box::new(code_exec_tool(config)?)),
            _ => None,
        };
        if let Some(tool) = tool {
            debug!(tool = %name, "Registered tool");
            registry.register(tool);
        }
    }
    Ok(registry)
}

fn code_exec_tool(config: &ToolsConfig) -> Result<CodeExecTool, ToolError> {
    let tool = CodeExecTool::new(
        &config.interpreter,
        config.interpreter_args.clone(),
        config.exec_max_output_bytes,
    )?;
    if !config.exec_confine {
        warn!("code_exec runs snippets without filesystem confinement");
        return Ok(tool.unconfined());
    }
    Ok(tool.with_read_paths(config.exec_read_paths.iter().map(PathBuf::from).collect()))
}

/// Shared HTTP client builder for network tools.
fn http_client(
    tool_name: &str,
    redirect: reqwest::redirect::Policy,
) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .redirect(redirect)
        .build()
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("cannot build HTTP client: {e}"),
        })
}
