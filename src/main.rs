//! provtrack - terminal client for a VM provisioning panel
//!
//! Main entry point: submits VM creations, tracks them to completion and
//! runs quick actions against existing machines.

mod app;
mod config;
mod error;
mod lock;
mod notify;
mod panel_api;
mod refresher;
mod status;
#[cfg(test)]
mod testing;
mod tracker;
mod ui;
mod workflow;

use anyhow::Result;
use app::{App, ConfirmAction, FormField, InputMode};
use clap::Parser;
use config::Args;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, error, info};
use panel_api::QuickAction;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{io, time::Duration};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger - defaults to OFF to prevent terminal corruption
    // Set RUST_LOG=debug for debugging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let args = Args::parse();
    info!("Starting provtrack against {}", args.url);

    // Build the app before touching the terminal so argument errors print normally
    let mut app = App::new(&args)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.initialize();
    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Error: {:?}", err);
        println!("{:?}", err)
    }

    info!("provtrack terminated");
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        // Poll for completed background tasks
        app.poll_background_tasks().await;
        app.maybe_check_panel();

        terminal.draw(|frame| ui::draw(frame, app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                debug!("Key pressed: {:?} in mode: {:?}", key, app.input_mode);

                // Clear message after any key press in normal mode
                if matches!(app.input_mode, InputMode::Normal) && app.message.is_some() {
                    app.clear_message();
                }

                match &app.input_mode {
                    InputMode::Normal => handle_normal_mode(app, key),
                    InputMode::Editing(field) => {
                        let field = *field;
                        handle_editing(app, key, field);
                    }
                    InputMode::Confirmation { action, .. } => {
                        let action = action.clone();
                        handle_confirmation(app, key, action);
                    }
                    InputMode::Help => app.close_modal(),
                }
            }
        }

        if app.should_quit {
            info!("Application quit requested");
            return Ok(());
        }
    }
}

fn handle_normal_mode(app: &mut App, key: event::KeyEvent) {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.quit();
        }
        KeyCode::Tab | KeyCode::Down => app.focus_next(),
        KeyCode::BackTab | KeyCode::Up => app.focus_previous(),
        KeyCode::Enter => app.start_editing(),
        KeyCode::Char('c') => app.submit_creation(),
        KeyCode::Char('x') => app.cancel_tracking(),
        // Quick actions against the serial field
        KeyCode::Char('s') => app.request_quick_action(QuickAction::Start),
        KeyCode::Char('S') => app.request_quick_action(QuickAction::Stop),
        KeyCode::Char('r') => app.request_quick_action(QuickAction::Reset),
        KeyCode::Char('f') => app.request_quick_action(QuickAction::Refresh),
        KeyCode::Char('?') | KeyCode::Char('h') => app.show_help(),
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
        _ => {}
    }
}

fn handle_editing(app: &mut App, key: event::KeyEvent, field: FormField) {
    match key.code {
        KeyCode::Enter | KeyCode::Esc => app.stop_editing(),
        KeyCode::Tab => {
            app.stop_editing();
            app.focus_next();
        }
        KeyCode::Backspace => app.input_backspace(field),
        KeyCode::Char(c) => app.input_char(field, c),
        _ => {}
    }
}

fn handle_confirmation(app: &mut App, key: event::KeyEvent, action: ConfirmAction) {
    match key.code {
        KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm(action),
        KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => app.cancel_dialog(),
        _ => {}
    }
}
