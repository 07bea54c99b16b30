//! Terminal UI
//!
//! A list of agents (zoomed out) or one agent in detail (zoomed in), with an
//! input line at the bottom. The UI never touches agents directly; it reads
//! registry snapshots and calls into the [`Orchestrator`].

mod app;
mod events;
mod render;

pub use app::*;
pub use events::{KeyAction, handle_key};

use crate::config::STATUS_REFRESH_INTERVAL;
use crate::orchestrator::Orchestrator;
use crate::{AtelierError, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tracing::info;

/// How long one keyboard poll may block the loop
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// View mode for the TUI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Every agent, one line each
    List,
    /// The focused agent
    Detail,
}

/// Split the terminal into header, content, banner, input and key help
pub fn main_layout(area: Rect, banner: bool) -> Vec<Rect> {
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),                             // Header
            Constraint::Min(5),                                // Agents
            Constraint::Length(if banner { 1 } else { 0 }),    // Banner
            Constraint::Length(3),                             // Input
            Constraint::Length(1),                             // Key help
        ])
        .split(area)
        .to_vec()
}

/// Take over the terminal and run until the user quits.
///
/// Every agent is killed on the way out.
pub async fn run(orchestrator: Orchestrator) -> Result<()> {
    enable_raw_mode().map_err(|e| AtelierError::Terminal(format!("raw mode unavailable: {e}")))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    info!(
        component = "tui",
        event = "tui_started",
        adapter = orchestrator.adapter_name(),
        agent_kind = %orchestrator.agent_kind(),
        working_directory = %orchestrator.working_directory().display(),
        "TUI started"
    );

    let mut app = App::new(orchestrator);
    let result = run_app(&mut terminal, &mut app).await;
    app.orchestrator.shutdown();

    // Always restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!(component = "tui", event = "tui_stopped", "TUI stopped");

    result
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let mut last_refresh = Instant::now();

    while !app.should_quit {
        app.orchestrator.drain_events().await;

        if last_refresh.elapsed() >= STATUS_REFRESH_INTERVAL {
            app.orchestrator.spawn_refresh();
            last_refresh = Instant::now();
        }

        let snapshot = app.orchestrator.snapshot();
        terminal.draw(|frame| render::render(frame, app, &snapshot))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = handle_key(app, key) {
                        app.perform(action).await;
                    }
                }
            }
        }
    }

    Ok(())
}
