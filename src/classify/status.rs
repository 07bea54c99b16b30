//! Status classification of agent output
//!
//! Turns the tail of an agent's output into a coarse state and a one line
//! summary. Failures never escape as errors from [`ModelStatusClassifier`]:
//! anything that goes wrong degrades to "working / Processing...".

use super::{CompletionClient, CompletionRequest, parse_json_reply, response_text};
use crate::Result;
use crate::agent::{AgentState, StatusUpdate, tail_chars};
use crate::config::{CLASSIFIER_WINDOW_CHARS, STATUS_MAX_TOKENS};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Summary reported when the model could not be consulted
pub const FALLBACK_SUMMARY: &str = "Processing...";

#[async_trait]
pub trait StatusClassifier: Send + Sync {
    /// Classify `output`, the agent's recent raw output.
    async fn classify(&self, agent_id: &str, output: &str) -> Result<StatusUpdate>;
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReplyState {
    Working,
    NeedsInput,
    Done,
}

impl From<ReplyState> for AgentState {
    fn from(state: ReplyState) -> Self {
        match state {
            ReplyState::Working => AgentState::Working,
            ReplyState::NeedsInput => AgentState::NeedsInput,
            ReplyState::Done => AgentState::Done,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    state: Option<ReplyState>,
    summary: Option<String>,
}

/// The update reported whenever classification fails
pub fn fallback_status(window: &str) -> StatusUpdate {
    StatusUpdate {
        state: Some(AgentState::Working),
        summary: Some(FALLBACK_SUMMARY.to_string()),
        last_output: Some(window.to_string()),
    }
}

fn status_prompt(window: &str) -> String {
    format!(
        "You are monitoring a coding agent running in a terminal. Based on its most recent \
         output below, classify what it is doing.\n\n\
         Respond with JSON only, in exactly this shape:\n\
         {{\"state\": \"working\" | \"needs_input\" | \"done\", \"summary\": \"...\"}}\n\n\
         - \"working\": it is still making progress\n\
         - \"needs_input\": it asked a question or is waiting for the user\n\
         - \"done\": it finished its task\n\
         The summary is one or two short sentences describing what it is doing.\n\n\
         Recent output:\n<output>\n{}\n</output>",
        window
    )
}

/// Status classifier backed by a completion model
pub struct ModelStatusClassifier {
    client: Arc<dyn CompletionClient>,
}

impl ModelStatusClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, window: &str) -> Result<StatusUpdate> {
        let request = CompletionRequest::user(STATUS_MAX_TOKENS, status_prompt(window));
        let blocks = self.client.complete(request).await?;
        let reply: StatusReply = parse_json_reply(&response_text(&blocks))?;

        let summary = reply
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string());

        Ok(StatusUpdate {
            state: Some(reply.state.map(AgentState::from).unwrap_or(AgentState::Working)),
            summary: Some(summary),
            last_output: Some(window.to_string()),
        })
    }
}

#[async_trait]
impl StatusClassifier for ModelStatusClassifier {
    async fn classify(&self, agent_id: &str, output: &str) -> Result<StatusUpdate> {
        let window = tail_chars(output, CLASSIFIER_WINDOW_CHARS);
        debug!(
            component = "status_classifier",
            event = "classifier_call",
            agent_id = %agent_id,
            model = %self.client.model_name(),
            chars = window.chars().count(),
            "Classifying agent status"
        );

        match self.ask(window).await {
            Ok(update) => {
                debug!(
                    component = "status_classifier",
                    event = "classifier_response",
                    agent_id = %agent_id,
                    state = ?update.state,
                    summary = update.summary.as_deref().unwrap_or(""),
                    "Status classified"
                );
                Ok(update)
            }
            Err(e) => {
                warn!(
                    component = "status_classifier",
                    event = "classifier_failure",
                    agent_id = %agent_id,
                    error = %e,
                    "Status classification failed, using fallback"
                );
                Ok(fallback_status(window))
            }
        }
    }
}
