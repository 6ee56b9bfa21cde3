use crate::ai::AiError;
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Coarse failure category carried on every failed `TaskResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Decision,
    Execution,
    Delegation,
    Timeout,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to get valid decision from LLM after {attempts} attempts: {last_error}")]
    DecisionExhausted { attempts: u32, last_error: String },

    #[error("Failed to get decision from LLM: {0}")]
    DecisionBackend(#[source] AiError),

    #[error("Failed to get execution response from LLM: {0}")]
    Execution(#[source] AiError),

    #[error("JSON generation failed: {0}")]
    DirectGeneration(#[source] AiError),

    #[error("Decision was 'delegate' but no sub_tasks provided")]
    EmptyDelegation,

    #[error("Task exceeded its deadline of {0}s")]
    Timeout(u64),

    #[error("Task was cancelled before completion")]
    Cancelled,

    #[error("Unexpected error in agent: {message}\n\nTraceback:\n{trace}")]
    InternalFault { message: String, trace: String },
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Configuration(_) => ErrorKind::Configuration,
            WorkerError::DecisionExhausted { .. } | WorkerError::DecisionBackend(_) => {
                ErrorKind::Decision
            }
            WorkerError::Execution(_) | WorkerError::DirectGeneration(_) => ErrorKind::Execution,
            WorkerError::EmptyDelegation => ErrorKind::Delegation,
            WorkerError::Timeout(_) => ErrorKind::Timeout,
            WorkerError::Cancelled => ErrorKind::Cancelled,
            WorkerError::InternalFault { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err = WorkerError::from(ConfigError::MissingCredential("OPENAI_API_KEY"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("OPENAI_API_KEY environment variable not set"));

        assert_eq!(WorkerError::EmptyDelegation.kind(), ErrorKind::Delegation);
        assert_eq!(
            WorkerError::DirectGeneration(AiError::EmptyResponse).kind(),
            ErrorKind::Execution
        );
        assert_eq!(WorkerError::Timeout(5).kind().as_ref(), "timeout");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_value(ErrorKind::Internal).unwrap(), "internal");
        assert_eq!(ErrorKind::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_exhausted_message_names_attempts() {
        let err = WorkerError::DecisionExhausted {
            attempts: 3,
            last_error: "response is not valid JSON".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("after 3 attempts"));
        assert!(msg.contains("not valid JSON"));
    }
}
