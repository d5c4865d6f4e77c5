use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod config;
mod modules;
mod ui;

use app::{App, MenuSection};
use config::Config;

fn init_tracing(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Opening log file {:?}", path))?;

    // stdout belongs to the TUI, so logs go to a file
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(
            EnvFilter::try_from_env("NOTIFDESK_LOG")
                .unwrap_or_else(|_| "notifdesk=info".into()),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;
    info!(config = ?config.path, api = %config.api_base_url, "starting notifdesk");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = match App::new(config).await {
        Ok(mut app) => run_app(&mut terminal, &mut app).await,
        Err(e) => Err(e),
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "exiting with error");
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent { code, modifiers, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press { continue; }
                match code {
                    KeyCode::Char('q') => return Ok(()),
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(())
                    }
                    KeyCode::Char('?') => { app.show_help = !app.show_help; }
                    KeyCode::Esc => {
                        if app.show_help { app.show_help = false; } else { app.clear_error(); }
                    }
                    KeyCode::Char('1') => app.set_section(MenuSection::Inbox),
                    KeyCode::Char('2') => app.set_section(MenuSection::Preferences),
                    KeyCode::Char('3') => app.set_section(MenuSection::Activity),
                    KeyCode::Up | KeyCode::Char('k') => app.previous_item(),
                    KeyCode::Down | KeyCode::Char('j') => app.next_item(),
                    KeyCode::Home => app.go_home(),
                    KeyCode::End => app.go_end(),
                    KeyCode::Tab => app.next_section(),
                    KeyCode::BackTab => app.previous_section(),
                    KeyCode::Enter => {
                        if let Err(e) = app.activate_item().await { app.report_error("Action failed", e); }
                    }
                    KeyCode::Char('o') if app.current_section == MenuSection::Inbox => {
                        if let Err(e) = app.open_selected().await { app.report_error("Open failed", e); }
                    }
                    KeyCode::Char(' ') if app.current_section == MenuSection::Preferences => {
                        app.toggle_selected_preference().await;
                    }
                    KeyCode::Char('m') if app.current_section == MenuSection::Inbox => {
                        app.mark_selected_read().await;
                    }
                    KeyCode::Char('M') => app.mark_all_read().await,
                    KeyCode::Char('r') => app.reload().await,
                    KeyCode::Char('p') => app.poll_now(),
                    KeyCode::Char('T') => app.send_test_notification().await,
                    KeyCode::Char('x') => app.dismiss_toast(),
                    KeyCode::Char('X') => app.dismiss_all_toasts(),
                    _ => {}
                }
            }
        }

        app.auto_refresh();
    }
}
