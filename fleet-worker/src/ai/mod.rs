pub mod openai;

#[cfg(test)]
pub mod mock;

pub use openai::OpenAIClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Output shape the backend is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonObject => "json_object",
        }
    }
}

/// A single completion call: messages, optional format constraint, a hard
/// timeout and an optional model override.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub response_format: Option<ResponseFormat>,
    pub timeout: Duration,
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, timeout: Duration) -> Self {
        Self {
            messages,
            response_format: None,
            timeout,
            model: None,
        }
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Transport-level failures from a completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("completion request failed: {0}")]
    Request(String),
    #[error("completion request timed out after {0}s")]
    Timeout(u64),
    #[error("completion backend returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse completion response: {0}")]
    Parse(String),
    #[error("completion backend returned empty content")]
    EmptyResponse,
}

/// Abstraction over the text-completion backend so the worker can run
/// against OpenAI in production and a scripted client in tests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError>;
}
