//! `threadloom threads`: inspect, rename and disable stored threads.

use std::path::Path;

use threadloom_core::thread::ThreadId;

use super::{CmdResult, load_config, open_store};

pub async fn list(config_path: Option<&Path>, owner: &str) -> CmdResult {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let threads = store.list_threads(owner).await?;

    if threads.is_empty() {
        println!("No threads for {owner}.");
        return Ok(());
    }
    for thread in threads {
        let status = if thread.disabled { " (disabled)" } else { "" };
        println!(
            "{}  {}  updated {}{status}",
            thread.id,
            thread.title,
            thread.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn show(config_path: Option<&Path>, id: &str) -> CmdResult {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let thread_id = ThreadId::from(id);
    let thread = store.get_thread(&thread_id).await?;

    println!("Thread {}  owner {}  \"{}\"", thread.id, thread.owner_id, thread.title);
    if thread.disabled {
        println!("(disabled)");
    }
    println!();
    for stored in store.list_messages(&thread_id).await? {
        let message = &stored.message;
        let label = match &message.tool_name {
            Some(tool) => format!("{} ({tool})", message.role),
            None => message.role.to_string(),
        };
        println!("#{} {label}:", stored.ordinal);
        if !message.content.is_empty() {
            println!("  {}", message.content.replace('\n', "\n  "));
        }
        for call in &message.tool_calls {
            println!("  -> {}({})", call.name, call.arguments);
        }
    }
    Ok(())
}

pub async fn rename(config_path: Option<&Path>, id: &str, title: &str, owner: &str) -> CmdResult {
    let title = title.trim();
    if title.is_empty() {
        return Err("Title must not be empty".into());
    }
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let thread = store.rename_thread(&ThreadId::from(id), owner, title).await?;
    println!("Renamed thread {} to \"{}\"", thread.id, thread.title);
    Ok(())
}

pub async fn disable(config_path: Option<&Path>, id: &str, owner: &str) -> CmdResult {
    let config = load_config(config_path)?;
    let store = open_store(&config).await?;
    let thread = store.disable_thread(&ThreadId::from(id), owner).await?;
    println!("Disabled thread {}", thread.id);
    Ok(())
}
