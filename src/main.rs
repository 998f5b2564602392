mod app;
mod backend;
mod bridge;
mod config;
mod events;
mod markdown;
mod stream;
mod ui;

use std::io;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::{App, Route};
use crate::bridge::BackendHandle;
use crate::config::Config;
use crate::events::{ChatId, PushEvent};

#[derive(Parser)]
#[command(name = "confab")]
#[command(version)]
#[command(about = "Terminal chat front-end over an asynchronous backend bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all conversations
    List,
    /// Open a conversation by id
    Open { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_logging(&config)?;

    let bridge = bridge::channel();
    backend::spawn(bridge.requests, bridge.push_tx);
    let handle = bridge.handle;
    let push_rx = bridge.push_rx;

    match cli.command {
        Some(Commands::List) => list_chats(&handle).await,
        Some(Commands::Open { id }) => {
            let id = ChatId::parse(&id).context("not a valid chat id")?;
            // Best effort: a missing chat is handled by the screen itself
            // with a notice and a redirect home.
            let _ = handle.switch_chat(id).await;
            run_tui(handle, push_rx, config, Route::Chat(Some(id))).await
        }
        None => run_tui(handle, push_rx, config, Route::Home).await,
    }
}

fn init_logging(config: &Config) -> Result<()> {
    // The terminal belongs to the UI; logs go to a file under the config dir.
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())
        .context("Failed to open log file")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn list_chats(handle: &BackendHandle) -> Result<()> {
    let chats = handle.list_chats().await?;
    if chats.is_empty() {
        println!("No chats yet. Run 'confab' to start your first conversation!");
        return Ok(());
    }

    println!("Your chats:\n");
    for chat in chats {
        let stamp = chat
            .last_message_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M");
        println!("  • {}  ({stamp})", chat.display_title());
        println!("    id: {}", chat.id);
    }
    Ok(())
}

/// Restores the terminal even when the app errors out.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
    }
}

async fn run_tui(
    handle: BackendHandle,
    push_rx: mpsc::UnboundedReceiver<PushEvent>,
    config: Config,
    route: Route,
) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let _guard = TerminalGuard;
    execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = App::new(handle, push_rx, config, route).await;
    app.run(&mut terminal).await
}
