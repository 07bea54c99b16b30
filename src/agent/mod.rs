//! Agent data model and in-memory registry
//!
//! An agent is one supervised external process working on a single task.

mod buffer;
mod names;
mod registry;

pub use buffer::OutputBuffer;
pub use names::*;
pub use registry::*;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported agent kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    #[default]
    ClaudeCode,
    Amp,
    Custom(String),
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::ClaudeCode => write!(f, "claude-code"),
            AgentKind::Amp => write!(f, "amp"),
            AgentKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl AgentKind {
    /// Parse agent kind from CLI string
    pub fn from_name(s: &str) -> Self {
        match s {
            "claude-code" | "claude" => AgentKind::ClaudeCode,
            "amp" | "ampcode" => AgentKind::Amp,
            other => AgentKind::Custom(other.to_string()),
        }
    }
}

/// Immutable description of what an agent was asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique id, also the display name
    pub id: String,
    pub kind: AgentKind,
    pub working_directory: PathBuf,
    /// Free-text instruction handed to the agent
    pub task: String,
    /// Tools the agent may use, in order
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
}

/// Coarse lifecycle state of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Spawned, nothing classified yet
    Starting,
    Working,
    /// Last output looks like a question for the user
    NeedsInput,
    Done,
    Error,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Starting => "starting",
            AgentState::Working => "working",
            AgentState::NeedsInput => "needs_input",
            AgentState::Done => "done",
            AgentState::Error => "error",
        }
    }

    /// Whether the periodic refresh should ask the status classifier
    pub fn is_classifiable(self) -> bool {
        matches!(self, AgentState::Working | AgentState::Starting)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live status of an agent, merged into by partial updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub state: AgentState,
    pub summary: String,
    /// Most recent output, at most `LAST_OUTPUT_CHARS` characters
    pub last_output: String,
}

impl AgentStatus {
    pub fn starting(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: AgentState::Starting,
            summary: String::new(),
            last_output: String::new(),
        }
    }

    /// Merge the fields present in `update`. The id never changes.
    pub fn merge(&mut self, update: StatusUpdate) {
        if let Some(state) = update.state {
            self.state = state;
        }
        if let Some(summary) = update.summary {
            self.summary = summary;
        }
        if let Some(last_output) = update.last_output {
            self.last_output = last_output;
        }
    }
}

/// Any subset of the mutable status fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: Option<AgentState>,
    pub summary: Option<String>,
    pub last_output: Option<String>,
}

impl StatusUpdate {
    pub fn state(state: AgentState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
