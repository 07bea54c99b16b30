//! Main TUI application state

use super::{KeyAction, ViewMode};
use crate::agent::AgentState;
use crate::orchestrator::Orchestrator;
use tracing::debug;

/// Main application state
pub struct App {
    pub orchestrator: Orchestrator,
    /// Text typed into the input line
    pub input: String,
    /// Whether help overlay is showing
    pub show_help: bool,
    /// Whether the app should quit
    pub should_quit: bool,
}

impl App {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            input: String::new(),
            show_help: false,
            should_quit: false,
        }
    }

    /// Detail view while an existing agent is focused, list view otherwise
    pub fn view_mode(&self) -> ViewMode {
        match self.orchestrator.focused_agent_id() {
            Some(_) => ViewMode::Detail,
            None => ViewMode::List,
        }
    }

    /// Empty the input line, returning what was typed
    pub fn take_input(&mut self) -> String {
        std::mem::take(&mut self.input)
    }

    /// Toggle help overlay
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Carry out an action that needs the orchestrator's async side.
    pub async fn perform(&mut self, action: KeyAction) {
        debug!(component = "tui", event = "key_action", action = ?action, "Key action");
        match action {
            KeyAction::Submit(text) => {
                self.orchestrator.begin_submit(&text);
            }
            KeyAction::SendToFocused(text) => {
                self.orchestrator.send_to_focused(&text).await;
            }
            KeyAction::KillFocused => {
                self.orchestrator.kill_focused();
            }
            KeyAction::Quit => {
                self.should_quit = true;
            }
        }
    }

    /// Get icon and label for a state
    pub fn state_display(state: AgentState) -> (&'static str, &'static str) {
        match state {
            AgentState::Starting => ("○", "starting"),
            AgentState::Working => ("●", "working"),
            AgentState::NeedsInput => ("?", "needs input"),
            AgentState::Done => ("✓", "done"),
            AgentState::Error => ("✗", "error"),
        }
    }

    /// Format duration as human-readable string
    pub fn format_duration(duration: chrono::Duration) -> String {
        let secs = duration.num_seconds().max(0);
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m", secs / 60)
        } else if secs < 86400 {
            let hours = secs / 3600;
            let mins = (secs % 3600) / 60;
            if mins > 0 {
                format!("{}h {}m", hours, mins)
            } else {
                format!("{}h", hours)
            }
        } else {
            format!("{}d", secs / 86400)
        }
    }
}
