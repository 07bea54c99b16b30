//! Keyboard handling
//!
//! Keys that only move focus or edit the input line are handled right here.
//! Anything that has to wait on the orchestrator comes back as a
//! [`KeyAction`] for the run loop to perform.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{App, ViewMode};

/// Work a key press asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Classify this text and spawn agents for it
    Submit(String),
    /// Write this line to the focused agent
    SendToFocused(String),
    KillFocused,
    Quit,
}

/// Handle one key press
pub fn handle_key(app: &mut App, key: KeyEvent) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
        return Some(KeyAction::Quit);
    }

    if app.show_help {
        // Any key closes help
        app.show_help = false;
        return None;
    }

    match app.view_mode() {
        ViewMode::List => handle_list_key(app, key),
        ViewMode::Detail => handle_detail_key(app, key),
    }
}

fn handle_list_key(app: &mut App, key: KeyEvent) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        // Digits pick an agent only while nothing has been typed
        KeyCode::Char(c @ '1'..='9') if app.input.is_empty() => {
            if let Some(digit) = c.to_digit(10) {
                app.orchestrator.focus_by_digit(digit);
            }
            None
        }
        KeyCode::Char('?') if app.input.is_empty() => {
            app.toggle_help();
            None
        }
        KeyCode::Char(c) if !ctrl => {
            app.input.push(c);
            None
        }
        KeyCode::Backspace => {
            app.input.pop();
            None
        }
        KeyCode::Enter => {
            // Keep the text while a previous submission is still running
            if app.orchestrator.is_processing() || app.input.trim().is_empty() {
                return None;
            }
            Some(KeyAction::Submit(app.take_input()))
        }
        KeyCode::Esc => {
            if app.input.is_empty() {
                app.orchestrator.dismiss_banner();
            } else {
                app.input.clear();
            }
            None
        }
        _ => None,
    }
}

fn handle_detail_key(app: &mut App, key: KeyEvent) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Esc => {
            app.orchestrator.clear_focus();
            app.input.clear();
            None
        }
        KeyCode::Char('k') if ctrl => {
            app.input.clear();
            Some(KeyAction::KillFocused)
        }
        KeyCode::Char(c) if !ctrl => {
            app.input.push(c);
            None
        }
        KeyCode::Backspace => {
            app.input.pop();
            None
        }
        KeyCode::Enter => {
            if app.input.is_empty() {
                return None;
            }
            Some(KeyAction::SendToFocused(app.take_input()))
        }
        _ => None,
    }
}
