//! Orchestration loop
//!
//! The [`Orchestrator`] is the single owner of the [`Registry`]. Everything
//! that happens elsewhere, agent output, process exits and classifier
//! results, comes back to it as a [`LoopEvent`] on one channel and is folded
//! into the registry by [`Orchestrator::handle_event`]. Slow work (input
//! classification, status refresh batches) runs on background tasks that
//! only ever report back through that channel.

use crate::adapter::{AgentAdapter, AgentEvent};
use crate::agent::{
    AgentConfig, AgentKind, AgentState, NameGenerator, Registry, Snapshot, StatusUpdate,
};
use crate::classify::{Classification, InputClassifier, StatusClassifier, TaskRequest};
use crate::config::CLASSIFIER_TIMEOUT;
use crate::{AtelierError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Upper bound on events folded in by one [`Orchestrator::drain_events`] call
const MAX_EVENTS_PER_DRAIN: usize = 512;

/// Message shown above the input line until the next submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Error(String),
    Clarification(String),
}

impl Banner {
    pub fn text(&self) -> &str {
        match self {
            Banner::Error(text) | Banner::Clarification(text) => text,
        }
    }
}

/// Everything that can change the registry from outside the loop
#[derive(Debug)]
pub enum LoopEvent {
    /// Output or exit of one agent, in the order the agent produced them
    Agent { id: String, event: AgentEvent },
    /// A background input classification finished
    InputClassified(Result<Classification>),
    /// One refresh tick's worth of status results, applied together
    StatusBatch(Vec<(String, StatusUpdate)>),
}

pub struct Orchestrator {
    registry: Registry,
    names: NameGenerator,
    adapter: Arc<dyn AgentAdapter>,
    input_classifier: Arc<dyn InputClassifier>,
    status_classifier: Arc<dyn StatusClassifier>,
    working_directory: PathBuf,
    agent_kind: AgentKind,
    is_processing: bool,
    refresh_in_flight: bool,
    banner: Option<Banner>,
    events_tx: mpsc::UnboundedSender<LoopEvent>,
    events_rx: mpsc::UnboundedReceiver<LoopEvent>,
    forwarders: HashMap<String, JoinHandle<()>>,
    background: Vec<AbortHandle>,
}

impl Orchestrator {
    pub fn new(
        adapter: Arc<dyn AgentAdapter>,
        input_classifier: Arc<dyn InputClassifier>,
        status_classifier: Arc<dyn StatusClassifier>,
        working_directory: impl Into<PathBuf>,
        agent_kind: AgentKind,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry: Registry::new(),
            names: NameGenerator::new(),
            adapter,
            input_classifier,
            status_classifier,
            working_directory: working_directory.into(),
            agent_kind,
            is_processing: false,
            refresh_in_flight: false,
            banner: None,
            events_tx,
            events_rx,
            forwarders: HashMap::new(),
            background: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.registry.snapshot()
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Whether a submission is being classified or spawned
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Whether a refresh batch is still out with the status classifier
    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight
    }

    pub fn agent_kind(&self) -> &AgentKind {
        &self.agent_kind
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn adapter_name(&self) -> &'static str {
        self.adapter.name()
    }

    // ---------------------------------------------------------------------
    // Submission
    // ---------------------------------------------------------------------

    fn accept_submission(&mut self, input: &str) -> bool {
        if input.trim().is_empty() {
            return false;
        }
        if self.is_processing {
            debug!(
                component = "orchestrator",
                event = "submission_dropped",
                "Submission already in flight"
            );
            return false;
        }

        self.is_processing = true;
        self.banner = None;
        info!(
            component = "orchestrator",
            event = "submission_received",
            chars = input.chars().count(),
            "Submission received"
        );
        true
    }

    /// Start a submission without waiting for the classifier.
    ///
    /// The result arrives later as [`LoopEvent::InputClassified`]. Returns
    /// false when the input was blank or another submission is in flight.
    pub fn begin_submit(&mut self, input: &str) -> bool {
        if !self.accept_submission(input) {
            return false;
        }

        let classifier = self.input_classifier.clone();
        let input = input.to_string();
        self.spawn_background(
            async move { classify_input(classifier.as_ref(), &input).await },
            |outcome| {
                LoopEvent::InputClassified(outcome.unwrap_or_else(|e| {
                    Err(AtelierError::Classifier(format!("input classification aborted: {e}")))
                }))
            },
        );
        true
    }

    /// Classify and spawn in one go.
    pub async fn submit(&mut self, input: &str) -> bool {
        if !self.accept_submission(input) {
            return false;
        }
        let result = classify_input(self.input_classifier.as_ref(), input).await;
        self.finish_submission(result).await;
        true
    }

    async fn finish_submission(&mut self, result: Result<Classification>) {
        match result {
            Err(e) => {
                warn!(
                    component = "orchestrator",
                    event = "submission_failed",
                    error = %e,
                    "Input classification failed"
                );
                self.banner = Some(Banner::Error(format!("Could not process input: {e}")));
            }
            Ok(Classification {
                clarification: Some(question),
                ..
            }) => {
                info!(
                    component = "orchestrator",
                    event = "submission_completed",
                    spawned = 0,
                    clarification = true,
                    "Clarification requested"
                );
                self.banner = Some(Banner::Clarification(question));
            }
            Ok(Classification { tasks, .. }) => self.spawn_tasks(&tasks).await,
        }
        self.is_processing = false;
    }

    /// Spawn tasks in order, abandoning the rest at the first failure.
    async fn spawn_tasks(&mut self, tasks: &[TaskRequest]) {
        let mut spawned = 0;
        for task in tasks {
            match self.spawn_agent(task).await {
                Ok(_) => spawned += 1,
                Err(e) => {
                    warn!(
                        component = "orchestrator",
                        event = "submission_failed",
                        error = %e,
                        spawned,
                        abandoned = tasks.len() - spawned - 1,
                        "Failed to spawn agent"
                    );
                    self.banner = Some(Banner::Error(format!("Failed to start agent: {e}")));
                    return;
                }
            }
        }

        info!(
            component = "orchestrator",
            event = "submission_completed",
            spawned,
            clarification = false,
            "Submission completed"
        );
    }

    async fn spawn_agent(&mut self, task: &TaskRequest) -> Result<String> {
        let id = self.names.generate(&task.prompt);
        let config = AgentConfig {
            id: id.clone(),
            kind: self.agent_kind.clone(),
            working_directory: self.working_directory.clone(),
            task: task.prompt.clone(),
            tools: task.suggested_tools.clone(),
            system_prompt: None,
        };

        let handle = self.adapter.spawn(&config).await?;
        let events = handle.subscribe();
        self.registry.add_agent(config, handle);

        let forwarder = tokio::spawn(forward_events(id.clone(), events, self.events_tx.clone()));
        self.forwarders.insert(id.clone(), forwarder);
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Event loop
    // ---------------------------------------------------------------------

    /// Next event, if one is already queued
    pub fn try_next_event(&mut self) -> Option<LoopEvent> {
        self.events_rx.try_recv().ok()
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<LoopEvent> {
        self.events_rx.recv().await
    }

    /// Fold in queued events without waiting. Returns how many were handled.
    pub async fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_EVENTS_PER_DRAIN {
            let Some(event) = self.try_next_event() else {
                break;
            };
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Agent {
                id,
                event: AgentEvent::Output(chunk),
            } => self.registry.append_output(&id, &chunk),
            LoopEvent::Agent {
                id,
                event: AgentEvent::Exit(code),
            } => self.on_exit(&id, code),
            LoopEvent::InputClassified(result) => self.finish_submission(result).await,
            LoopEvent::StatusBatch(results) => {
                self.refresh_in_flight = false;
                self.apply_batch(results);
            }
        }
    }

    // Any exit counts as done, whatever the exit code
    fn on_exit(&mut self, id: &str, code: Option<i32>) {
        self.forwarders.remove(id);
        if !self.registry.contains(id) {
            return;
        }
        info!(
            component = "orchestrator",
            event = "agent_exited",
            agent_id = %id,
            code = ?code,
            "Agent exited"
        );
        self.registry.update_status(id, StatusUpdate::state(AgentState::Done));
    }

    // ---------------------------------------------------------------------
    // Status refresh
    // ---------------------------------------------------------------------

    /// Agents worth classifying right now, with a copy of their buffers
    fn refresh_plan(&self) -> Vec<(String, String)> {
        let mut plan = Vec::new();
        for agent in self.registry.agents() {
            if !agent.status().state.is_classifiable() {
                continue;
            }
            if agent.output().is_empty() {
                debug!(
                    component = "orchestrator",
                    event = "status_skipped_empty",
                    agent_id = %agent.config.id,
                    "No output to classify"
                );
                continue;
            }
            plan.push((agent.config.id.clone(), agent.output().as_str().to_string()));
        }
        plan
    }

    fn apply_batch(&mut self, results: Vec<(String, StatusUpdate)>) {
        let count = results.len();
        for (id, update) in results {
            let Some(state) = self.registry.get(&id).map(|agent| agent.status().state) else {
                continue;
            };
            // The agent may have exited while its classification was out
            if !state.is_classifiable() {
                debug!(
                    component = "orchestrator",
                    event = "status_discarded",
                    agent_id = %id,
                    state = state.as_str(),
                    "Stale classification dropped"
                );
                continue;
            }
            self.registry.update_status(&id, update);
        }
        debug!(
            component = "orchestrator",
            event = "refresh_applied",
            count,
            "Status refresh applied"
        );
    }

    /// Kick off a refresh tick in the background.
    ///
    /// Returns false when nothing needs classifying or the previous batch is
    /// still in flight, in which case this tick is skipped.
    pub fn spawn_refresh(&mut self) -> bool {
        if self.refresh_in_flight {
            debug!(
                component = "orchestrator",
                event = "refresh_skipped",
                "Previous refresh still running"
            );
            return false;
        }
        let plan = self.refresh_plan();
        if plan.is_empty() {
            return false;
        }

        self.refresh_in_flight = true;
        let classifier = self.status_classifier.clone();
        self.spawn_background(classify_batch(classifier, plan), |outcome| {
            LoopEvent::StatusBatch(outcome.unwrap_or_else(|e| {
                warn!(
                    component = "orchestrator",
                    event = "refresh_aborted",
                    error = %e,
                    "Status refresh task failed"
                );
                Vec::new()
            }))
        });
        true
    }

    /// Run one refresh tick to completion.
    pub async fn refresh_statuses(&mut self) {
        let plan = self.refresh_plan();
        if plan.is_empty() {
            return;
        }
        let results = classify_batch(self.status_classifier.clone(), plan).await;
        self.apply_batch(results);
    }

    fn spawn_background<F, R>(&mut self, work: F, report: R)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
        R: FnOnce(std::result::Result<F::Output, JoinError>) -> LoopEvent + Send + 'static,
    {
        // The inner task turns a panic into a JoinError the report can see
        let work = tokio::spawn(work);
        let work_abort = work.abort_handle();
        let events = self.events_tx.clone();
        let reporter = tokio::spawn(async move {
            let outcome = work.await;
            let _ = events.send(report(outcome));
        });
        self.background.retain(|task| !task.is_finished());
        // Reporter before work: a cancelled work task is never reported
        self.background.push(reporter.abort_handle());
        self.background.push(work_abort);
    }

    fn abort_background(&mut self) {
        for task in self.background.drain(..) {
            task.abort();
        }
        self.refresh_in_flight = false;
        self.is_processing = false;
    }

    // ---------------------------------------------------------------------
    // Focus and direct interaction
    // ---------------------------------------------------------------------

    /// Focus the `digit`-th agent (1-based) in display order.
    ///
    /// Only works while nothing is focused; out of range digits do nothing.
    pub fn focus_by_digit(&mut self, digit: u32) -> bool {
        if self.registry.focused_agent().is_some() || !(1..=9).contains(&digit) {
            return false;
        }
        let Some(id) = self
            .registry
            .ids()
            .nth(digit as usize - 1)
            .map(str::to_string)
        else {
            return false;
        };
        self.registry.set_focused_agent(Some(id));
        true
    }

    /// Id of the focused agent, if it still exists
    pub fn focused_agent_id(&self) -> Option<&str> {
        self.registry
            .focused_agent()
            .map(|agent| agent.config.id.as_str())
    }

    pub fn clear_focus(&mut self) {
        self.registry.set_focused_agent(None);
    }

    /// Write a line to the focused agent. An agent that was waiting for
    /// input goes back to `working`.
    pub async fn send_to_focused(&mut self, text: &str) -> bool {
        let Some(agent) = self.registry.focused_agent() else {
            return false;
        };
        let id = agent.config.id.clone();
        let state = agent.status().state;
        let sent = agent.handle().send(text).await;

        if let Err(e) = sent {
            warn!(
                component = "orchestrator",
                event = "input_failed",
                agent_id = %id,
                error = %e,
                "Failed to send input"
            );
            self.banner = Some(Banner::Error(format!("Could not send to {id}: {e}")));
            return false;
        }

        info!(
            component = "orchestrator",
            event = "input_sent",
            agent_id = %id,
            chars = text.chars().count(),
            "Input sent to agent"
        );
        if state == AgentState::NeedsInput {
            self.registry.update_status(&id, StatusUpdate::state(AgentState::Working));
        }
        true
    }

    /// Kill and forget one agent.
    pub fn remove_agent(&mut self, id: &str) -> bool {
        if let Some(forwarder) = self.forwarders.remove(id) {
            forwarder.abort();
        }
        self.registry.remove_agent(id)
    }

    /// Remove the focused agent and drop focus. Returns the removed id.
    pub fn kill_focused(&mut self) -> Option<String> {
        let id = self.registry.focused_agent()?.config.id.clone();
        self.remove_agent(&id);
        self.registry.set_focused_agent(None);
        Some(id)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Forget every agent and issued name. Processes are left alone.
    ///
    /// Pending classifications are cancelled and queued events discarded, so
    /// nothing from before the reset can land on an agent that reuses a name.
    pub fn reset(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
        self.abort_background();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;

        self.registry.reset();
        self.names.reset_used_names();
        self.banner = None;
    }

    /// Kill all agents and stop background work.
    pub fn shutdown(&mut self) {
        let ids: Vec<String> = self.registry.ids().map(str::to_string).collect();
        for id in &ids {
            self.remove_agent(id);
        }
        self.abort_background();
        info!(
            component = "orchestrator",
            event = "shutdown",
            killed = ids.len(),
            "Orchestrator shut down"
        );
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for forwarder in self.forwarders.values() {
            forwarder.abort();
        }
        for task in &self.background {
            task.abort();
        }
    }
}

fn timed_out(what: &str) -> AtelierError {
    AtelierError::Classifier(format!(
        "{what} timed out after {}s",
        CLASSIFIER_TIMEOUT.as_secs()
    ))
}

async fn classify_input(classifier: &dyn InputClassifier, input: &str) -> Result<Classification> {
    tokio::time::timeout(CLASSIFIER_TIMEOUT, classifier.classify(input))
        .await
        .unwrap_or_else(|_| Err(timed_out("input classification")))
}

/// Classify agents one after another; a failing or stalled agent is skipped.
async fn classify_batch(
    classifier: Arc<dyn StatusClassifier>,
    plan: Vec<(String, String)>,
) -> Vec<(String, StatusUpdate)> {
    let mut results = Vec::with_capacity(plan.len());
    for (id, output) in plan {
        let outcome = tokio::time::timeout(CLASSIFIER_TIMEOUT, classifier.classify(&id, &output))
            .await
            .unwrap_or_else(|_| Err(timed_out("status classification")));
        match outcome {
            Ok(update) => results.push((id, update)),
            Err(e) => warn!(
                component = "orchestrator",
                event = "classifier_failure",
                agent_id = %id,
                error = %e,
                "Status refresh failed for agent"
            ),
        }
    }
    results
}

/// Relay one agent's events into the loop until it exits.
async fn forward_events(
    id: String,
    mut events: broadcast::Receiver<AgentEvent>,
    sink: mpsc::UnboundedSender<LoopEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let exited = matches!(event, AgentEvent::Exit(_));
                let delivered = sink
                    .send(LoopEvent::Agent {
                        id: id.clone(),
                        event,
                    })
                    .is_ok();
                if exited || !delivered {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    component = "orchestrator",
                    event = "output_lagged",
                    agent_id = %id,
                    skipped,
                    "Dropped agent events"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::testing::{FakeAdapter, LogCapture, ScriptedInput, ScriptedStatus};
    use std::time::Duration;

    struct Harness {
        orch: Orchestrator,
        adapter: Arc<FakeAdapter>,
        input: Arc<ScriptedInput>,
        status: Arc<ScriptedStatus>,
    }

    fn harness_with(adapter: FakeAdapter, kind: AgentKind) -> Harness {
        let adapter = Arc::new(adapter);
        let input = Arc::new(ScriptedInput::new());
        let status = Arc::new(ScriptedStatus::new());
        let orch = Orchestrator::new(
            adapter.clone(),
            input.clone(),
            status.clone(),
            "/work/repo",
            kind,
        );
        Harness {
            orch,
            adapter,
            input,
            status,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeAdapter::new(), AgentKind::ClaudeCode)
    }

    fn tasks(prompts: &[&str]) -> Classification {
        Classification {
            tasks: prompts.iter().map(|p| TaskRequest::new(*p)).collect(),
            clarification: None,
        }
    }

    /// Handle events until the loop has been quiet for a moment
    async fn settle(orch: &mut Orchestrator) {
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(100), orch.next_event()).await
        {
            orch.handle_event(event).await;
        }
    }

    fn state_of(orch: &Orchestrator, id: &str) -> AgentState {
        orch.snapshot().get(id).unwrap().status.state
    }

    /// One agent with output and a refresh batch out with the classifier
    async fn refreshing_harness(configure: impl FnOnce(&ScriptedStatus)) -> Harness {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        h.adapter.probe("fix-login-bug").emit_output("compiling\n");
        settle(&mut h.orch).await;
        configure(h.status.as_ref());

        assert!(h.orch.spawn_refresh());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.status.in_flight(), 1);
        h
    }

    #[tokio::test]
    async fn submit_spawns_one_agent_per_task() {
        let mut h = harness();
        let mut classification = tasks(&["write the parser", "document the parser"]);
        classification.tasks[0].suggested_tools = Some(vec!["Edit".to_string()]);
        h.input.reply(classification);

        assert!(h.orch.submit("parser stuff").await);

        let snapshot = h.orch.snapshot();
        let ids: Vec<&str> = snapshot.agents.iter().map(|a| a.config.id.as_str()).collect();
        assert_eq!(ids, vec!["write-parser", "document-parser"]);
        assert!(snapshot.agents.iter().all(|a| a.status.state == AgentState::Starting));

        let spawned = h.adapter.spawned();
        assert_eq!(spawned[0].task, "write the parser");
        assert_eq!(spawned[0].tools, Some(vec!["Edit".to_string()]));
        assert_eq!(spawned[0].working_directory, PathBuf::from("/work/repo"));
        assert_eq!(spawned[1].tools, None);
        assert!(!h.orch.is_processing());
        assert!(h.orch.banner().is_none());
    }

    #[tokio::test]
    async fn blank_input_does_nothing() {
        let mut h = harness();
        assert!(!h.orch.submit("   ").await);
        assert!(!h.orch.begin_submit(""));
        assert!(h.input.calls().is_empty());
        assert!(!h.orch.is_processing());
    }

    #[tokio::test]
    async fn clarification_spawns_nothing_until_next_submission() {
        let mut h = harness();
        h.input.reply(Classification::clarify("Which repository?"));

        h.orch.submit("deploy it").await;
        assert_eq!(
            h.orch.banner(),
            Some(&Banner::Clarification("Which repository?".to_string()))
        );
        assert_eq!(h.adapter.attempts(), 0);

        h.orch.submit("fix login bug").await;
        assert!(h.orch.banner().is_none());
        assert_eq!(h.orch.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn classifier_error_becomes_banner() {
        let mut h = harness();
        h.input.reply_error("service down");

        h.orch.submit("fix login bug").await;
        assert!(matches!(h.orch.banner(), Some(Banner::Error(msg)) if msg.contains("service down")));
        assert!(h.orch.snapshot().is_empty());
        assert!(!h.orch.is_processing());
    }

    #[tokio::test]
    async fn spawn_failure_abandons_remaining_tasks() {
        let mut h = harness_with(FakeAdapter::failing_on(1), AgentKind::ClaudeCode);
        h.input
            .reply(tasks(&["write the parser", "document the parser", "benchmark the parser"]));

        h.orch.submit("parser stuff").await;

        assert_eq!(h.adapter.attempts(), 2);
        let snapshot = h.orch.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("write-parser").is_some());
        assert_eq!(h.adapter.probe("write-parser").kill_count(), 0);
        assert!(matches!(h.orch.banner(), Some(Banner::Error(_))));
        assert!(!h.orch.is_processing());
    }

    #[tokio::test]
    async fn unsupported_kind_is_reported() {
        let mut h = harness_with(FakeAdapter::rejecting(AgentKind::Amp), AgentKind::Amp);

        h.orch.submit("fix login bug").await;
        assert!(matches!(h.orch.banner(), Some(Banner::Error(msg)) if msg.contains("amp")));
        assert!(h.orch.snapshot().is_empty());
    }

    #[tokio::test]
    async fn second_submission_in_flight_is_dropped() {
        let mut h = harness();

        assert!(h.orch.begin_submit("fix login bug"));
        assert!(!h.orch.begin_submit("something else"));
        assert!(h.orch.is_processing());

        settle(&mut h.orch).await;

        assert!(!h.orch.is_processing());
        assert_eq!(h.input.calls(), vec!["fix login bug".to_string()]);
        assert_eq!(h.orch.snapshot().len(), 1);
        assert!(h.orch.begin_submit("another task entirely"));
    }

    #[tokio::test]
    async fn repeated_task_gets_unique_name_until_reset() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        h.orch.submit("fix login bug").await;

        let ids: Vec<String> = h.orch.snapshot().agents.iter().map(|a| a.config.id.clone()).collect();
        assert_eq!(ids[0], "fix-login-bug");
        let suffix = ids[1].strip_prefix("fix-login-bug-").unwrap();
        assert_eq!(suffix.len(), 3);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        h.orch.reset();
        assert!(h.orch.snapshot().is_empty());
        h.orch.submit("fix login bug").await;
        assert!(h.orch.snapshot().get("fix-login-bug").is_some());
    }

    #[tokio::test]
    async fn output_is_appended_in_order() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        let probe = h.adapter.probe("fix-login-bug");

        probe.emit_output("one ");
        probe.emit_output("two ");
        probe.emit_output("three");
        settle(&mut h.orch).await;

        let snapshot = h.orch.snapshot();
        let agent = snapshot.get("fix-login-bug").unwrap();
        assert_eq!(agent.output, "one two three");
        assert_eq!(agent.status.last_output, "one two three");
    }

    #[tokio::test]
    async fn exit_marks_agent_done_whatever_the_code() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;

        h.adapter.probe("write-parser").emit_exit(Some(0));
        h.adapter.probe("document-parser").emit_output("boom\n");
        h.adapter.probe("document-parser").emit_exit(Some(2));
        settle(&mut h.orch).await;

        assert_eq!(state_of(&h.orch, "write-parser"), AgentState::Done);
        assert_eq!(state_of(&h.orch, "document-parser"), AgentState::Done);

        h.orch.refresh_statuses().await;
        assert!(h.status.calls().is_empty());
    }

    #[tokio::test]
    async fn refresh_skips_empty_buffers() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;

        h.orch.refresh_statuses().await;
        assert!(h.status.calls().is_empty());
        assert!(!h.orch.spawn_refresh());
        assert!(!h.orch.is_refreshing());
    }

    #[tokio::test]
    async fn refresh_classifies_only_agents_with_output() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;
        h.adapter.probe("write-parser").emit_output("lexing tokens\n");
        settle(&mut h.orch).await;

        h.orch.refresh_statuses().await;

        assert_eq!(
            h.status.calls(),
            vec![("write-parser".to_string(), "lexing tokens\n".to_string())]
        );
        let snapshot = h.orch.snapshot();
        let classified = snapshot.get("write-parser").unwrap();
        assert_eq!(classified.status.state, AgentState::Working);
        assert_eq!(classified.status.summary, "write-parser is busy");
        assert_eq!(classified.status.last_output, "lexing tokens\n");
        assert_eq!(state_of(&h.orch, "document-parser"), AgentState::Starting);
    }

    #[tokio::test]
    async fn refresh_sends_the_full_buffer() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        let probe = h.adapter.probe("fix-login-bug");
        let output = "x".repeat(1800);
        probe.emit_output(&output);
        settle(&mut h.orch).await;

        h.orch.refresh_statuses().await;
        assert_eq!(h.status.calls()[0].1, output);
    }

    #[tokio::test]
    async fn needs_input_and_done_are_not_classified() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;
        for id in ["write-parser", "document-parser"] {
            h.adapter.probe(id).emit_output("output\n");
        }
        settle(&mut h.orch).await;

        h.orch
            .registry
            .update_status("write-parser", StatusUpdate::state(AgentState::NeedsInput));
        h.orch
            .registry
            .update_status("document-parser", StatusUpdate::state(AgentState::Error));

        h.orch.refresh_statuses().await;
        assert!(h.status.calls().is_empty());
    }

    #[tokio::test]
    async fn one_failing_classification_does_not_block_others() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;
        for id in ["write-parser", "document-parser"] {
            h.adapter.probe(id).emit_output("output\n");
        }
        settle(&mut h.orch).await;
        h.status.fail_for("write-parser");

        h.orch.refresh_statuses().await;

        assert_eq!(h.status.calls().len(), 2);
        assert_eq!(state_of(&h.orch, "write-parser"), AgentState::Starting);
        assert_eq!(state_of(&h.orch, "document-parser"), AgentState::Working);
    }

    #[tokio::test]
    async fn overlapping_refresh_ticks_are_skipped() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        h.adapter.probe("fix-login-bug").emit_output("compiling\n");
        settle(&mut h.orch).await;

        assert!(h.orch.spawn_refresh());
        assert!(!h.orch.spawn_refresh());
        assert!(h.orch.is_refreshing());

        settle(&mut h.orch).await;

        assert!(!h.orch.is_refreshing());
        assert_eq!(h.status.calls().len(), 1);
        assert_eq!(state_of(&h.orch, "fix-login-bug"), AgentState::Working);
        assert!(h.orch.spawn_refresh());
    }

    #[tokio::test]
    async fn stale_classification_does_not_revive_finished_agent() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        h.adapter.probe("fix-login-bug").emit_exit(Some(0));
        settle(&mut h.orch).await;

        h.orch.apply_batch(vec![(
            "fix-login-bug".to_string(),
            StatusUpdate::state(AgentState::Working),
        )]);
        h.orch.apply_batch(vec![("ghost".to_string(), StatusUpdate::state(AgentState::Working))]);

        assert_eq!(state_of(&h.orch, "fix-login-bug"), AgentState::Done);
        assert_eq!(h.orch.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn digits_focus_only_without_focus_and_in_range() {
        let mut h = harness();
        h.input
            .reply(tasks(&["write the parser", "document the parser", "benchmark the parser"]));
        h.orch.submit("parser stuff").await;

        assert!(!h.orch.focus_by_digit(0));
        assert!(!h.orch.focus_by_digit(4));
        assert!(h.orch.snapshot().focused().is_none());

        assert!(h.orch.focus_by_digit(2));
        assert_eq!(h.orch.snapshot().focused().unwrap().config.id, "document-parser");

        assert!(!h.orch.focus_by_digit(1));
        assert_eq!(h.orch.snapshot().focused().unwrap().config.id, "document-parser");

        h.orch.clear_focus();
        assert!(h.orch.focus_by_digit(3));
        assert_eq!(h.orch.snapshot().focused().unwrap().config.id, "benchmark-parser");
    }

    #[tokio::test]
    async fn send_to_focused_resumes_waiting_agent() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        assert!(!h.orch.send_to_focused("yes").await);

        h.orch.focus_by_digit(1);
        h.orch
            .registry
            .update_status("fix-login-bug", StatusUpdate::state(AgentState::NeedsInput));

        assert!(h.orch.send_to_focused("yes").await);
        assert_eq!(h.adapter.probe("fix-login-bug").sent(), vec!["yes".to_string()]);
        assert_eq!(state_of(&h.orch, "fix-login-bug"), AgentState::Working);
    }

    #[tokio::test]
    async fn kill_focused_removes_agent() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;
        h.orch.focus_by_digit(1);

        assert_eq!(h.orch.kill_focused(), Some("write-parser".to_string()));
        assert_eq!(h.adapter.probe("write-parser").kill_count(), 1);
        let snapshot = h.orch.snapshot();
        assert!(snapshot.focused_agent_id.is_none());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(h.orch.kill_focused(), None);
    }

    #[tokio::test]
    async fn events_for_removed_agents_are_ignored() {
        let mut h = harness();
        h.orch.submit("fix login bug").await;
        let probe = h.adapter.probe("fix-login-bug");
        assert!(h.orch.remove_agent("fix-login-bug"));

        probe.emit_output("late output");
        h.orch
            .handle_event(LoopEvent::Agent {
                id: "fix-login-bug".to_string(),
                event: AgentEvent::Exit(Some(0)),
            })
            .await;
        settle(&mut h.orch).await;

        assert!(h.orch.snapshot().is_empty());
        assert_eq!(probe.kill_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_kills_every_agent() {
        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;

        h.orch.shutdown();

        assert!(h.orch.snapshot().is_empty());
        for id in ["write-parser", "document-parser"] {
            assert_eq!(h.adapter.probe(id).kill_count(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_status_classifier_times_out() {
        let mut h = refreshing_harness(ScriptedStatus::stall).await;
        assert!(!h.orch.spawn_refresh());

        let event = h.orch.next_event().await.unwrap();
        h.orch.handle_event(event).await;

        assert!(!h.orch.is_refreshing());
        assert_eq!(h.status.in_flight(), 0);
        assert_eq!(state_of(&h.orch, "fix-login-bug"), AgentState::Starting);
        assert!(h.orch.spawn_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_input_classifier_releases_submissions() {
        let mut h = harness();
        h.input.stall();
        assert!(h.orch.begin_submit("fix login bug"));

        let event = h.orch.next_event().await.unwrap();
        h.orch.handle_event(event).await;

        assert!(!h.orch.is_processing());
        assert!(matches!(h.orch.banner(), Some(Banner::Error(msg)) if msg.contains("timed out")));
        assert!(h.orch.snapshot().is_empty());
        assert!(h.orch.begin_submit("fix login bug"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_discards_refresh_started_before_it() {
        let mut h = refreshing_harness(|status| {
            status.delay(Duration::from_secs(5));
            status.reply_for(
                "fix-login-bug",
                StatusUpdate {
                    state: Some(AgentState::NeedsInput),
                    summary: Some("waiting on the old prompt".to_string()),
                    last_output: None,
                },
            );
        })
        .await;

        h.orch.reset();
        assert!(!h.orch.is_refreshing());
        assert!(!h.orch.is_processing());

        h.orch.submit("fix login bug").await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.orch.drain_events().await;

        let snapshot = h.orch.snapshot();
        let agent = snapshot.get("fix-login-bug").unwrap();
        assert_eq!(agent.status.state, AgentState::Starting);
        assert_eq!(agent.status.summary, "");
        assert_eq!(agent.output, "");
        assert_eq!(h.status.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_classification_in_flight() {
        let mut h = refreshing_harness(ScriptedStatus::stall).await;

        h.orch.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.status.in_flight(), 0);
        assert!(!h.orch.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_orchestrator_cancels_classification_in_flight() {
        let h = refreshing_harness(ScriptedStatus::stall).await;
        let status = h.status.clone();

        drop(h);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(status.in_flight(), 0);
    }

    #[tokio::test]
    async fn submissions_and_refreshes_are_logged() {
        let logs = LogCapture::default();
        let _guard = logs.install(LogLevel::Debug);

        let mut h = harness();
        h.input.reply(tasks(&["write the parser", "document the parser"]));
        h.orch.submit("parser stuff").await;
        h.adapter.probe("write-parser").emit_output("lexing tokens\n");
        settle(&mut h.orch).await;
        h.orch.refresh_statuses().await;
        h.status.fail_for("write-parser");
        h.orch.refresh_statuses().await;
        h.input.reply_error("service down");
        h.orch.submit("more parser stuff").await;

        for (component, event) in [
            ("orchestrator", "submission_received"),
            ("orchestrator", "submission_completed"),
            ("orchestrator", "submission_failed"),
            ("orchestrator", "status_skipped_empty"),
            ("orchestrator", "classifier_failure"),
            ("store", "agent_added"),
            ("store", "output_appended"),
            ("store", "status_transition"),
        ] {
            assert!(logs.has(component, event), "missing {component}/{event}");
        }
    }
}
