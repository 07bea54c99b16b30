//! Agent adapter abstraction
//!
//! An adapter turns an [`AgentConfig`] into a running process and hands back
//! an [`AgentHandle`]. The orchestrator never looks behind the handle: it
//! writes input, kills, and listens for [`AgentEvent`]s.

mod process;

pub use process::{ProcessAdapter, ProcessHandle};

use crate::Result;
use crate::agent::AgentConfig;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Events queued per handle before slow subscribers start lagging
pub const EVENT_CAPACITY: usize = 1024;

/// Something an agent process did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A chunk of combined stdout/stderr
    Output(String),
    /// The process ended. `None` when it was terminated by a signal.
    Exit(Option<i32>),
}

/// Capability for a single running agent
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Write a line of input to the agent
    async fn send(&self, text: &str) -> Result<()>;

    /// Tear the process down. Fire-and-forget, safe to call repeatedly.
    fn kill(&self);

    /// Subscribe to output and exit events.
    ///
    /// Every subscriber sees every event published after it subscribed. The
    /// first subscriber additionally sees everything since spawn.
    fn subscribe(&self) -> broadcast::Receiver<AgentEvent>;
}

#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start an agent for `config`. Fails for kinds the adapter cannot run.
    async fn spawn(&self, config: &AgentConfig) -> Result<Box<dyn AgentHandle>>;
}

/// Broadcast fan-out that keeps early events for the first subscriber
pub struct EventHub {
    sender: broadcast::Sender<AgentEvent>,
    first: Mutex<Option<broadcast::Receiver<AgentEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, first) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            first: Mutex::new(Some(first)),
        }
    }

    pub fn sender(&self) -> broadcast::Sender<AgentEvent> {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        let first = self.first.lock().ok().and_then(|mut slot| slot.take());
        first.unwrap_or_else(|| self.sender.subscribe())
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
