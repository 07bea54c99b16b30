//! Scripted fakes for unit tests

use crate::adapter::{AgentAdapter, AgentEvent, AgentHandle, EventHub};
use crate::agent::{AgentConfig, AgentKind, StatusUpdate};
use crate::classify::{
    Classification, CompletionClient, CompletionRequest, ContentBlock, InputClassifier,
    StatusClassifier,
};
use crate::config::LogLevel;
use crate::{AtelierError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Counts a call as in flight until its future finishes or is dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct HandleState {
    kills: AtomicUsize,
    sent: Mutex<Vec<String>>,
}

/// Test-side view of a [`FakeHandle`], usable after the handle is boxed away
#[derive(Clone)]
pub struct HandleProbe {
    state: Arc<HandleState>,
    events: broadcast::Sender<AgentEvent>,
}

impl HandleProbe {
    pub fn kill_count(&self) -> usize {
        self.state.kills.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn emit_output(&self, chunk: &str) {
        let _ = self.events.send(AgentEvent::Output(chunk.to_string()));
    }

    pub fn emit_exit(&self, code: Option<i32>) {
        let _ = self.events.send(AgentEvent::Exit(code));
    }
}

/// Handle that records kills and input instead of running anything
pub struct FakeHandle {
    state: Arc<HandleState>,
    hub: EventHub,
}

impl FakeHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(HandleState::default()),
            hub: EventHub::new(),
        }
    }

    pub fn probe(&self) -> HandleProbe {
        HandleProbe {
            state: self.state.clone(),
            events: self.hub.sender(),
        }
    }
}

#[async_trait]
impl AgentHandle for FakeHandle {
    async fn send(&self, text: &str) -> Result<()> {
        self.state.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn kill(&self) {
        self.state.kills.fetch_add(1, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.hub.subscribe()
    }
}

#[derive(Default)]
struct AdapterState {
    attempts: usize,
    spawned: Vec<AgentConfig>,
    probes: HashMap<String, HandleProbe>,
}

/// Adapter handing out [`FakeHandle`]s
#[derive(Default)]
pub struct FakeAdapter {
    state: Mutex<AdapterState>,
    /// Zero-based spawn attempt that fails
    fail_on_attempt: Option<usize>,
    unsupported: Option<AgentKind>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on_attempt: Some(attempt),
            ..Self::default()
        }
    }

    pub fn rejecting(kind: AgentKind) -> Self {
        Self {
            unsupported: Some(kind),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    /// Configs of successful spawns, in order
    pub fn spawned(&self) -> Vec<AgentConfig> {
        self.state.lock().unwrap().spawned.clone()
    }

    pub fn probe(&self, id: &str) -> HandleProbe {
        self.state
            .lock()
            .unwrap()
            .probes
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no agent spawned as {id}"))
    }
}

#[async_trait]
impl AgentAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn spawn(&self, config: &AgentConfig) -> Result<Box<dyn AgentHandle>> {
        let mut state = self.state.lock().unwrap();
        let attempt = state.attempts;
        state.attempts += 1;

        if self.unsupported.as_ref() == Some(&config.kind) {
            return Err(AtelierError::UnsupportedAgent(config.kind.to_string()));
        }
        if self.fail_on_attempt == Some(attempt) {
            return Err(AtelierError::Agent(format!("spawn {attempt} refused")));
        }

        let handle = FakeHandle::new();
        state.probes.insert(config.id.clone(), handle.probe());
        state.spawned.push(config.clone());
        Ok(Box::new(handle))
    }
}

/// Status classifier answering "working" and recording every call
#[derive(Default)]
pub struct ScriptedStatus {
    calls: Mutex<Vec<(String, String)>>,
    replies: Mutex<HashMap<String, StatusUpdate>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    stalled: AtomicBool,
    in_flight: Arc<AtomicUsize>,
}

impl ScriptedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_for(&self, id: &str, update: StatusUpdate) {
        self.replies.lock().unwrap().insert(id.to_string(), update);
    }

    pub fn fail_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Answer every call only after `delay`
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Never answer at all
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Calls started and neither answered nor cancelled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// `(agent_id, output)` per call
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusClassifier for ScriptedStatus {
    async fn classify(&self, agent_id: &str, output: &str) -> Result<StatusUpdate> {
        self.calls
            .lock()
            .unwrap()
            .push((agent_id.to_string(), output.to_string()));
        let _guard = InFlight::enter(&self.in_flight);

        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(agent_id) {
            return Err(AtelierError::Classifier(format!("scripted failure for {agent_id}")));
        }
        let scripted = self.replies.lock().unwrap().get(agent_id).cloned();
        Ok(scripted.unwrap_or_else(|| StatusUpdate {
            state: Some(crate::agent::AgentState::Working),
            summary: Some(format!("{agent_id} is busy")),
            last_output: None,
        }))
    }
}

/// Input classifier returning queued results, else the input as one task
#[derive(Default)]
pub struct ScriptedInput {
    calls: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<std::result::Result<Classification, String>>>,
    stalled: AtomicBool,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, classification: Classification) {
        self.replies.lock().unwrap().push_back(Ok(classification));
    }

    pub fn reply_error(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    /// Never answer the next calls
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputClassifier for ScriptedInput {
    async fn classify(&self, input: &str) -> Result<Classification> {
        self.calls.lock().unwrap().push(input.to_string());
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(classification)) => Ok(classification),
            Some(Err(message)) => Err(AtelierError::Classifier(message)),
            None => Ok(Classification::single_task(input)),
        }
    }
}

/// Completion client replaying queued replies; an empty queue is an error
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<std::result::Result<Vec<ContentBlock>, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_text(&self, text: &str) {
        self.reply_blocks(vec![ContentBlock::Text {
            text: text.to_string(),
        }]);
    }

    pub fn reply_blocks(&self, blocks: Vec<ContentBlock>) {
        self.replies.lock().unwrap().push_back(Ok(blocks));
    }

    pub fn reply_error(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<ContentBlock>> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(blocks)) => Ok(blocks),
            Some(Err(message)) => Err(AtelierError::Classifier(message)),
            None => Err(AtelierError::Classifier("no scripted reply".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Debug-level JSON records captured from the crate's own subscriber
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Capture this thread's events at `level` until the guard drops
    pub fn install(&self, level: LogLevel) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        tracing::subscriber::set_default(crate::logging::subscriber(level, move || writer.clone()))
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// `(component, event)` of every record, in emission order
    pub fn tags(&self) -> Vec<(String, String)> {
        self.records()
            .iter()
            .map(|record| {
                (
                    record["component"].as_str().unwrap_or_default().to_string(),
                    record["event"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    pub fn has(&self, component: &str, event: &str) -> bool {
        self.tags()
            .iter()
            .any(|(c, e)| c == component && e == event)
    }
}
