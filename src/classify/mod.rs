//! Language-model backed classifiers
//!
//! Both classifiers talk to a chat-completion endpoint through
//! [`CompletionClient`] and share the same tolerant reply handling: models
//! like to wrap JSON in prose, so the reply is scanned for the first `{` and
//! the last `}` and only that span is parsed.

mod anthropic;
mod input;
mod status;

pub use anthropic::AnthropicClient;
pub use input::*;
pub use status::*;

use crate::{AtelierError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// One call to the completion endpoint. The model is chosen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub max_tokens: u32,
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// A single user turn
    pub fn user(max_tokens: u32, content: impl Into<String>) -> Self {
        Self {
            max_tokens,
            system: None,
            messages: vec![Message {
                role: Role::User,
                content: content.into(),
            }],
        }
    }
}

/// A block of a completion reply. Only text is ever consumed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Tool calls, thinking, anything else
    #[serde(other)]
    Other,
}

/// Concatenated text of a reply; non-text blocks count as empty.
pub fn response_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => text.as_str(),
            ContentBlock::Other => "",
        })
        .collect()
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Vec<ContentBlock>>;

    fn model_name(&self) -> &str;
}

/// The span from the first `{` to the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Extract and deserialize the JSON object embedded in a model reply.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| AtelierError::Classifier("no JSON object in reply".to_string()))?;
    Ok(serde_json::from_str(json)?)
}
