use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionClient, CompletionRequest, ContentBlock, Message};
use crate::config::CLASSIFIER_TIMEOUT;
use crate::{AtelierError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Messages API client
pub struct AnthropicClient {
    model: String,
    api_key: String,
    url: String,
    http_client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(CLASSIFIER_TIMEOUT)
            .build()?;
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            url: ANTHROPIC_API_URL.to_string(),
            http_client,
        })
    }

    /// Point the client at a different endpoint, e.g. a proxy.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: &request.messages,
        }
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<ContentBlock>> {
        let response = self
            .http_client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AtelierError::Classifier(format!(
                "Anthropic API error {status}: {body}"
            )));
        }

        let parsed: AnthropicResponse = response.json().await?;
        debug!(
            component = "llm",
            event = "completion_received",
            model = %self.model,
            blocks = parsed.content.len(),
            "Completion received"
        );
        Ok(parsed.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
