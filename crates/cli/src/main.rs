//! threadloom CLI: the main entry point.
//!
//! Commands:
//! - `serve`   : Start the HTTP gateway
//! - `chat`    : Run one turn and stream it to stdout
//! - `threads` : List, show, or disable threads
//! - `tools`   : List available tools
//! - `models`  : List reachable models
//! - `config`  : Show the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use threadloom_agent::TurnOptions;

mod commands;

#[derive(Parser)]
#[command(
    name = "threadloom",
    about = "threadloom, a streaming conversational inference backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (default: ~/.threadloom/config.toml)
    #[arg(short, long, global = true, env = "THREADLOOM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message and stream the reply
    Chat {
        /// Continue an existing thread
        #[arg(short, long)]
        thread: Option<String>,

        /// Model selector, e.g. `gpt-4o-mini` or `ollama/llama3`
        #[arg(short, long)]
        model: Option<String>,

        /// Print raw wire frames instead of text
        #[arg(long)]
        frames: bool,

        /// Answer without calling any tools
        #[arg(long)]
        no_tools: bool,

        /// The message to send
        message: String,
    },

    /// Manage threads
    Threads {
        #[command(subcommand)]
        action: ThreadsAction,
    },

    /// List available tools
    Tools,

    /// List reachable models
    Models,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ThreadsAction {
    /// List threads, most recently updated first
    List {
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// Print a thread's messages
    Show { id: String },
    /// Retitle a thread
    Rename {
        id: String,
        title: String,
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// Disable a thread
    Disable {
        id: String,
        #[arg(long, default_value = "local")]
        owner: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (default)
    Show,
    /// Print the config file path
    Path,
    /// Print the default configuration
    Defaults,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `chat` output stays clean
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat {
            thread,
            model,
            frames,
            no_tools,
            message,
        } => {
            let options = TurnOptions {
                model,
                tools: !no_tools,
            };
            commands::chat::run(config_path, thread, options, frames, message).await?
        }
        Commands::Threads { action } => match action {
            ThreadsAction::List { owner } => commands::threads::list(config_path, &owner).await?,
            ThreadsAction::Show { id } => commands::threads::show(config_path, &id).await?,
            ThreadsAction::Rename { id, title, owner } => {
                commands::threads::rename(config_path, &id, &title, &owner).await?
            }
            ThreadsAction::Disable { id, owner } => {
                commands::threads::disable(config_path, &id, &owner).await?
            }
        },
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Models => commands::models::run(config_path).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Defaults => commands::config_cmd::defaults().await?,
        },
    }

    Ok(())
}
