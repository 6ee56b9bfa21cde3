use crate::ai::{AiError, CompletionClient, CompletionRequest, ResponseFormat};
use crate::worker::error::WorkerError;
use crate::worker::prompts;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

pub struct TaskExecutor {
    client: Arc<dyn CompletionClient>,
    execution_model: String,
    direct_json_model: String,
}

impl TaskExecutor {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        execution_model: impl Into<String>,
        direct_json_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            execution_model: execution_model.into(),
            direct_json_model: direct_json_model.into(),
        }
    }

    /// Run the task as the persona, merging upstream output when present.
    /// Returns the backend text untouched.
    pub async fn execute(
        &self,
        task_id: &str,
        persona: &str,
        instructions: &str,
        context: &HashMap<String, String>,
    ) -> Result<String, WorkerError> {
        if !context.is_empty() {
            log::info!(
                "[EXECUTOR] Task {}: Synthesizing {} upstream results",
                task_id,
                context.len()
            );
        }

        let request = CompletionRequest::new(
            prompts::execution_messages(persona, instructions, context),
            EXECUTION_TIMEOUT,
        )
        .with_model(self.execution_model.clone());

        let content = self
            .client
            .complete(request)
            .await
            .map_err(WorkerError::Execution)?;

        if content.trim().is_empty() {
            return Err(WorkerError::Execution(AiError::EmptyResponse));
        }
        Ok(content)
    }

    /// Single JSON-only call with no decision step. Output is trimmed.
    pub async fn generate_json(
        &self,
        task_id: &str,
        persona: &str,
        instructions: &str,
    ) -> Result<String, WorkerError> {
        log::info!("[EXECUTOR] Task {}: Direct JSON generation", task_id);

        let request = CompletionRequest::new(
            prompts::direct_json_messages(persona, instructions),
            EXECUTION_TIMEOUT,
        )
        .with_format(ResponseFormat::JsonObject)
        .with_model(self.direct_json_model.clone());

        let content = self
            .client
            .complete(request)
            .await
            .map_err(WorkerError::DirectGeneration)?;

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(WorkerError::DirectGeneration(AiError::EmptyResponse));
        }
        Ok(trimmed.to_string())
    }
}
