//! Input classification: free text into tasks
//!
//! The model splits what the user typed into one or more independent tasks,
//! or asks a clarifying question. When the model cannot be used the whole
//! input becomes a single task, so a submission is never lost.

use super::{CompletionClient, CompletionRequest, parse_json_reply, response_text};
use crate::Result;
use crate::config::INPUT_MAX_TOKENS;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Clarification returned for blank input, without calling the model
pub const BLANK_INPUT_CLARIFICATION: &str = "Please provide a task description";

/// One unit of work to hand to an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub prompt: String,
    #[serde(
        default,
        rename = "suggestedTools",
        alias = "suggested_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub suggested_tools: Option<Vec<String>>,
}

impl TaskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            suggested_tools: None,
        }
    }
}

/// Outcome of classifying one submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub tasks: Vec<TaskRequest>,
    /// When set, nothing is spawned and this is shown to the user
    pub clarification: Option<String>,
}

impl Classification {
    /// The whole input as a single task
    pub fn single_task(input: &str) -> Self {
        Self {
            tasks: vec![TaskRequest::new(input)],
            clarification: None,
        }
    }

    pub fn clarify(question: impl Into<String>) -> Self {
        Self {
            tasks: Vec::new(),
            clarification: Some(question.into()),
        }
    }
}

#[async_trait]
pub trait InputClassifier: Send + Sync {
    async fn classify(&self, input: &str) -> Result<Classification>;
}

#[derive(Debug, Deserialize)]
struct InputReply {
    #[serde(default)]
    tasks: Vec<TaskRequest>,
    #[serde(default)]
    clarification: Option<String>,
}

fn input_prompt(input: &str) -> String {
    format!(
        "You dispatch work to autonomous coding agents. Split the user's request below into \
         independent tasks, one per agent. Each task prompt must be a complete, self-contained \
         instruction. Optionally suggest tool names the agent will need.\n\n\
         If the request is too vague to act on, ask one short clarifying question instead.\n\n\
         Respond with JSON only, in exactly this shape:\n\
         {{\"tasks\": [{{\"prompt\": \"...\", \"suggestedTools\": [\"...\"]}}], \"clarification\": null}}\n\
         or\n\
         {{\"tasks\": [], \"clarification\": \"...\"}}\n\n\
         User request:\n<request>\n{}\n</request>",
        input
    )
}

/// Input classifier backed by a completion model
pub struct ModelInputClassifier {
    client: Arc<dyn CompletionClient>,
}

impl ModelInputClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, input: &str) -> Result<Classification> {
        let request = CompletionRequest::user(INPUT_MAX_TOKENS, input_prompt(input));
        let blocks = self.client.complete(request).await?;
        let reply: InputReply = parse_json_reply(&response_text(&blocks))?;

        let clarification = reply
            .clarification
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let tasks: Vec<TaskRequest> = reply
            .tasks
            .into_iter()
            .filter(|task| !task.prompt.trim().is_empty())
            .collect();

        if let Some(question) = clarification {
            return Ok(Classification::clarify(question));
        }
        if tasks.is_empty() {
            return Err(crate::AtelierError::Classifier(
                "reply contained neither tasks nor a clarification".to_string(),
            ));
        }
        Ok(Classification {
            tasks,
            clarification: None,
        })
    }
}

#[async_trait]
impl InputClassifier for ModelInputClassifier {
    async fn classify(&self, input: &str) -> Result<Classification> {
        if input.trim().is_empty() {
            return Ok(Classification::clarify(BLANK_INPUT_CLARIFICATION));
        }

        debug!(
            component = "input_classifier",
            event = "classifier_call",
            model = %self.client.model_name(),
            chars = input.chars().count(),
            "Classifying input"
        );

        match self.ask(input).await {
            Ok(classification) => {
                debug!(
                    component = "input_classifier",
                    event = "classifier_response",
                    tasks = classification.tasks.len(),
                    clarification = classification.clarification.is_some(),
                    "Input classified"
                );
                Ok(classification)
            }
            Err(e) => {
                warn!(
                    component = "input_classifier",
                    event = "classifier_failure",
                    error = %e,
                    "Input classification failed, using raw input as one task"
                );
                Ok(Classification::single_task(input))
            }
        }
    }
}
