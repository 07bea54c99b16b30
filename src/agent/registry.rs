//! Agent registry - the authoritative table of live agents
//!
//! The registry has no I/O of its own. It is owned by the orchestrator and
//! mutated only through the operations below, so the buffer and status
//! invariants hold however output, status results and removals interleave.
//! Operations naming an unknown id are silent no-ops: classification results
//! routinely arrive after the agent they describe has been removed.

use super::{AgentConfig, AgentState, AgentStatus, OutputBuffer, StatusUpdate};
use crate::adapter::AgentHandle;
use crate::config::{LAST_OUTPUT_CHARS, OUTPUT_BUFFER_CHARS};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// A registered agent and everything the registry knows about it
pub struct Agent {
    pub config: AgentConfig,
    handle: Box<dyn AgentHandle>,
    status: AgentStatus,
    output: OutputBuffer,
    pub started_at: DateTime<Utc>,
}

impl Agent {
    pub fn status(&self) -> &AgentStatus {
        &self.status
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn handle(&self) -> &dyn AgentHandle {
        self.handle.as_ref()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("output_chars", &self.output.len())
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Read-only copy of one agent for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct AgentView {
    pub config: AgentConfig,
    pub status: AgentStatus,
    pub output: String,
    pub started_at: DateTime<Utc>,
}

impl From<&Agent> for AgentView {
    fn from(agent: &Agent) -> Self {
        Self {
            config: agent.config.clone(),
            status: agent.status.clone(),
            output: agent.output.as_str().to_string(),
            started_at: agent.started_at,
        }
    }
}

/// Point-in-time copy of the registry, in display order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub agents: Vec<AgentView>,
    /// May name an agent that no longer exists
    pub focused_agent_id: Option<String>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&AgentView> {
        self.agents.iter().find(|a| a.config.id == id)
    }

    /// The focused agent, treating a dangling id as no focus
    pub fn focused(&self) -> Option<&AgentView> {
        self.focused_agent_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Count of agents in the given state
    pub fn count_in(&self, state: AgentState) -> usize {
        self.agents.iter().filter(|a| a.status.state == state).count()
    }
}

/// Table of agents keyed by id, plus UI focus
#[derive(Default)]
pub struct Registry {
    agents: HashMap<String, Agent>,
    /// Insertion order, for stable list rendering
    order: Vec<String>,
    focused_agent_id: Option<String>,
    /// Reserved for a future shared input line
    orchestrator_input: String,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned agent in state `starting`.
    ///
    /// Ids must be unique; a duplicate replaces the existing entry.
    pub fn add_agent(&mut self, config: AgentConfig, handle: Box<dyn AgentHandle>) {
        let id = config.id.clone();
        let agent = Agent {
            status: AgentStatus::starting(id.clone()),
            output: OutputBuffer::new(OUTPUT_BUFFER_CHARS),
            started_at: Utc::now(),
            config,
            handle,
        };

        if self.agents.insert(id.clone(), agent).is_some() {
            warn!(component = "store", event = "agent_replaced", agent_id = %id, "Duplicate agent id replaced");
        } else {
            self.order.push(id.clone());
        }

        info!(
            component = "store",
            event = "agent_added",
            agent_id = %id,
            count = self.order.len(),
            "Agent added"
        );
    }

    /// Merge a partial status onto an agent. Unknown ids are ignored.
    pub fn update_status(&mut self, id: &str, update: StatusUpdate) {
        let Some(agent) = self.agents.get_mut(id) else {
            debug!(component = "store", event = "status_update_ignored", agent_id = %id, "Unknown agent");
            return;
        };

        let previous = agent.status.state;
        agent.status.merge(update);
        let current = agent.status.state;

        if previous != current {
            info!(
                component = "store",
                event = "status_transition",
                agent_id = %id,
                from = previous.as_str(),
                to = current.as_str(),
                "Agent state changed"
            );
        }
        debug!(
            component = "store",
            event = "status_updated",
            agent_id = %id,
            state = current.as_str(),
            summary = %agent.status.summary,
            "Agent status updated"
        );
    }

    /// Append output and refresh `last_output`. Unknown ids are ignored.
    pub fn append_output(&mut self, id: &str, chunk: &str) {
        let Some(agent) = self.agents.get_mut(id) else {
            debug!(component = "store", event = "output_ignored", agent_id = %id, "Unknown agent");
            return;
        };

        agent.output.write(chunk);
        agent.status.last_output = agent.output.tail(LAST_OUTPUT_CHARS).to_string();

        debug!(
            component = "store",
            event = "output_appended",
            agent_id = %id,
            chunk_chars = chunk.chars().count(),
            buffer_chars = agent.output.len(),
            "Agent output appended"
        );
    }

    /// Replace the focus pointer. The id is not checked against the table.
    pub fn set_focused_agent(&mut self, id: Option<String>) {
        if self.focused_agent_id != id {
            info!(
                component = "store",
                event = "focus_changed",
                agent_id = id.as_deref().unwrap_or(""),
                "Focus changed"
            );
        }
        self.focused_agent_id = id;
    }

    /// Raw focus pointer, possibly dangling
    pub fn focused_agent_id(&self) -> Option<&str> {
        self.focused_agent_id.as_deref()
    }

    /// The focused agent, or `None` if focus is unset or dangling
    pub fn focused_agent(&self) -> Option<&Agent> {
        self.focused_agent_id
            .as_deref()
            .and_then(|id| self.agents.get(id))
    }

    /// Kill and forget an agent. Returns whether it existed.
    pub fn remove_agent(&mut self, id: &str) -> bool {
        let Some(agent) = self.agents.remove(id) else {
            return false;
        };
        agent.handle.kill();
        self.order.retain(|existing| existing != id);

        info!(
            component = "store",
            event = "agent_removed",
            agent_id = %id,
            count = self.order.len(),
            "Agent removed"
        );
        true
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agents in display order
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    /// Ids in display order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn orchestrator_input(&self) -> &str {
        &self.orchestrator_input
    }

    pub fn set_orchestrator_input(&mut self, input: impl Into<String>) {
        self.orchestrator_input = input.into();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            agents: self.agents().map(AgentView::from).collect(),
            focused_agent_id: self.focused_agent_id.clone(),
        }
    }

    /// Drop every agent without killing anything.
    ///
    /// Callers that care about the processes must remove agents first.
    pub fn reset(&mut self) {
        self.agents.clear();
        self.order.clear();
        self.focused_agent_id = None;
        self.orchestrator_input.clear();
        debug!(component = "store", event = "reset", "Registry reset");
    }
}
