use anyhow::Result;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;

mod app;
mod config;
mod coordinator;
mod error;
mod events;
mod filter;
mod formatting;
mod model;
mod reconciler;
mod scheduler;
mod selection;
mod service;
mod session;
mod store;
mod ui;
mod utils;

use app::App;
use config::Config;
use service::HttpChatService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    utils::init_logging(&config.log_path())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    crate::info_log!("=== WhatsApp Web Client Starting ({}) ===", config.server_url);

    let service = HttpChatService::new(&config)?;
    let mut app = App::new(config, Arc::new(service))?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    if let Err(ref e) = res {
        crate::error_log!("run_app: {}", e);
    }
    res
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        if app.process_sync_events() {
            app.needs_redraw = true;
        }
        app.expire_status();

        // Only redraw when something changed
        if app.needs_redraw {
            terminal.draw(|f| ui::draw(f, app))?;
            app.needs_redraw = false;
        }

        // Short poll so completions from the network land promptly.
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !app.handle_key(key) {
                        break;
                    }
                }
                Event::FocusGained => app.set_visible(true),
                Event::FocusLost => app.set_visible(false),
                Event::Resize(_, _) => app.needs_redraw = true,
                _ => {}
            }
        }

        // Let spawned network tasks progress between polls.
        tokio::task::yield_now().await;
    }

    Ok(())
}
