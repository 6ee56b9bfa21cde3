use crate::ai::{AiError, CompletionClient, CompletionRequest, ResponseFormat};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAIResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, AiError> {
        let endpoint_url = match endpoint {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => DEFAULT_ENDPOINT.to_string(),
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Local proxies often run without a key
        if !api_key.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| AiError::Request(format!("Invalid API key format: {}", e)))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        // Timeouts are applied per request
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AiError::Request(format!("Failed to create HTTP client: {}", e)))?;

        let model_name = match model {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => DEFAULT_MODEL.to_string(),
        };

        Ok(Self {
            client,
            endpoint: endpoint_url,
            model: model_name,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAICompletionRequest {
        OpenAICompletionRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            response_format: request.response_format.and_then(|f| match f {
                ResponseFormat::Text => None,
                ResponseFormat::JsonObject => Some(OpenAIResponseFormat {
                    format_type: f.as_str(),
                }),
            }),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let body = self.build_request(&request);
        let timeout_secs = request.timeout.as_secs();

        log::info!(
            "[OPENAI] Sending request to {} with model {} ({} messages, format: {}, timeout: {}s)",
            self.endpoint,
            body.model,
            body.messages.len(),
            request.response_format.map(|f| f.as_str()).unwrap_or("text"),
            timeout_secs
        );
        log::debug!(
            "[OPENAI] Full request:\n{}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(timeout_secs)
                } else {
                    AiError::Request(format!("OpenAI API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                Ok(error_response) => error_response.error.message,
                Err(_) => error_text,
            };
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response_text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                AiError::Timeout(timeout_secs)
            } else {
                AiError::Request(format!("Failed to read OpenAI response: {}", e))
            }
        })?;

        log::debug!("[OPENAI] Raw response:\n{}", response_text);

        let response_data: OpenAICompletionResponse = serde_json::from_str(&response_text)
            .map_err(|e| AiError::Parse(format!("{} - body: {}", e, response_text)))?;

        let choice = response_data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::Parse("OpenAI API returned no choices".to_string()))?;

        log::info!(
            "[OPENAI] Response - content_len: {}, finish_reason: {:?}",
            choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
            choice.finish_reason
        );

        Ok(choice.message.content.unwrap_or_default())
    }
}
