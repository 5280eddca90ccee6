//! `threadloom chat`: run one turn locally and stream it to the terminal.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use threadloom_agent::{StreamEvent, TurnOptions, encoder};
use threadloom_core::identity::Identity;
use threadloom_core::thread::ThreadId;
use threadloom_core::tool::ToolStatus;
use threadloom_gateway::AppState;

use super::{CmdResult, load_config, open_store};

pub async fn run(
    config_path: Option<&Path>,
    thread: Option<String>,
    options: TurnOptions,
    frames: bool,
    message: String,
) -> CmdResult {
    let config = load_config(config_path)?;
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!("  No API key configured. Set THREADLOOM_API_KEY or add api_key to");
        eprintln!("    {}", threadloom_config::AppConfig::config_dir().join("config.toml").display());
        return Err("No API key found".into());
    }

    let store = open_store(&config).await?;
    let state = Arc::new(AppState::from_config(&config, store)?);
    let mut handle = state
        .turns
        .start_turn_with(Identity::local(), thread.map(ThreadId::from), message, options)
        .await?;

    let mut stdout = std::io::stdout();
    let mut failed = false;
    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                eprintln!();
                eprintln!("  [cancelled]");
                return Ok(());
            }
        };
        let Some(event) = event else { break };

        if frames {
            stdout.write_all(&encoder::encode(&event))?;
            stdout.flush()?;
            if event.is_done() {
                break;
            }
            continue;
        }

        match event {
            StreamEvent::TextDelta { text } => {
                print!("{text}");
                stdout.flush()?;
            }
            StreamEvent::ToolStarted { name, args, .. } => {
                eprintln!("  [tool] {name} {args}");
            }
            StreamEvent::ToolFinished {
                name,
                status,
                error_kind,
                ..
            } => match (status, error_kind) {
                (ToolStatus::Success, _) => eprintln!("  [tool] {name} ok"),
                (ToolStatus::Failure, Some(kind)) => eprintln!("  [tool] {name} failed: {kind}"),
                (ToolStatus::Failure, None) => eprintln!("  [tool] {name} failed"),
            },
            StreamEvent::Error { kind, message } => {
                failed = true;
                println!();
                eprintln!("  [error] {kind}: {message}");
            }
            StreamEvent::Done { thread_id } => {
                println!();
                eprintln!("  thread: {thread_id}");
                break;
            }
        }
    }

    if failed {
        return Err("turn failed".into());
    }
    Ok(())
}
