use crate::ai::{CompletionClient, CompletionRequest, Message, ResponseFormat};
use crate::gateway::events::EventBroadcaster;
use crate::gateway::protocol::GatewayEvent;
use crate::worker::error::WorkerError;
use crate::worker::prompts::{self, PromptState};
use crate::worker::types::{Decision, SubTaskSpec};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MAX_DECISION_ATTEMPTS: u32 = 3;
pub const DECISION_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a backend reply could not be turned into a `Decision`. The display
/// text is fed back to the backend verbatim on the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("response is not valid JSON ({0})")]
    InvalidJson(String),
    #[error("response must be a single JSON object")]
    NotAnObject,
    #[error("field `decision` is required")]
    MissingDecision,
    #[error("field `decision` must be \"execute\" or \"delegate\", got {0}")]
    InvalidDecision(String),
    #[error("field `reason` is required and must be a string")]
    MissingReason,
    #[error("decision \"delegate\" requires a non-empty `sub_tasks` list")]
    MissingSubTasks,
    #[error("sub_tasks[{index}] is invalid ({message})")]
    InvalidSubTask { index: usize, message: String },
}

/// Strip a surrounding ```json fence if the backend added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse then validate one backend reply.
pub fn parse_decision(raw: &str) -> Result<Decision, ValidationError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let decision = match object.get("decision") {
        None | Some(Value::Null) => return Err(ValidationError::MissingDecision),
        Some(Value::String(s)) => s.as_str(),
        Some(other) => return Err(ValidationError::InvalidDecision(other.to_string())),
    };

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingReason)?
        .to_string();

    match decision {
        "execute" => Ok(Decision::Execute { reason }),
        "delegate" => {
            let entries = match object.get("sub_tasks") {
                Some(Value::Array(entries)) if !entries.is_empty() => entries,
                _ => return Err(ValidationError::MissingSubTasks),
            };
            let sub_tasks = entries
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    serde_json::from_value::<SubTaskSpec>(entry.clone()).map_err(|e| {
                        ValidationError::InvalidSubTask {
                            index,
                            message: e.to_string(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Decision::Delegate { reason, sub_tasks })
        }
        other => Err(ValidationError::InvalidDecision(format!("\"{}\"", other))),
    }
}

/// Asks the backend to classify a task and keeps re-prompting with the
/// validation error until it gets a well-formed decision or runs out of
/// attempts.
pub struct DecisionValidator {
    client: Arc<dyn CompletionClient>,
    model: String,
    broadcaster: Arc<EventBroadcaster>,
}

impl DecisionValidator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            broadcaster,
        }
    }

    pub async fn classify(
        &self,
        task_id: &str,
        instructions: &str,
        persona: &str,
        context: &HashMap<String, String>,
    ) -> Result<Decision, WorkerError> {
        let mut prompt = PromptState::new(prompts::analysis_prompt(instructions, persona, context));
        let mut last_error: Option<ValidationError> = None;

        while prompt.attempt() <= MAX_DECISION_ATTEMPTS {
            let attempt = prompt.attempt();
            let request = CompletionRequest::new(vec![Message::user(prompt.render())], DECISION_TIMEOUT)
                .with_format(ResponseFormat::JsonObject)
                .with_model(self.model.clone());

            // Provider failures are not the backend's fault to correct
            let raw = self
                .client
                .complete(request)
                .await
                .map_err(WorkerError::DecisionBackend)?;

            match parse_decision(&raw) {
                Ok(decision) => {
                    self.broadcaster.broadcast(GatewayEvent::decision_attempt(
                        task_id,
                        attempt,
                        MAX_DECISION_ATTEMPTS,
                        None,
                    ));
                    return Ok(decision);
                }
                Err(e) => {
                    log::warn!(
                        "[VALIDATOR] Task {}: Validation failed (attempt {}/{}): {}",
                        task_id,
                        attempt,
                        MAX_DECISION_ATTEMPTS,
                        e
                    );
                    self.broadcaster.broadcast(GatewayEvent::decision_attempt(
                        task_id,
                        attempt,
                        MAX_DECISION_ATTEMPTS,
                        Some(&e.to_string()),
                    ));
                    prompt = prompt.corrected(&e);
                    last_error = Some(e);
                }
            }
        }

        Err(WorkerError::DecisionExhausted {
            attempts: MAX_DECISION_ATTEMPTS,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{Scripted, ScriptedClient};
    use crate::ai::AiError;
    use crate::worker::error::ErrorKind;

    const EXECUTE: &str = r#"{"decision": "execute", "reason": "Single focused deliverable"}"#;

    fn validator(client: Arc<ScriptedClient>) -> DecisionValidator {
        DecisionValidator::new(client, "gpt-4o", Arc::new(EventBroadcaster::new()))
    }

    #[test]
    fn test_parse_execute() {
        let decision = parse_decision(EXECUTE).unwrap();
        assert_eq!(
            decision,
            Decision::Execute {
                reason: "Single focused deliverable".into()
            }
        );
    }

    #[test]
    fn test_parse_execute_ignores_sub_tasks() {
        let raw = r#"{"decision": "execute", "reason": "r", "sub_tasks": [{"requested_persona": "x"}]}"#;
        assert!(matches!(parse_decision(raw), Ok(Decision::Execute { .. })));
    }

    #[test]
    fn test_parse_delegate_keeps_order() {
        let raw = r#"{
            "decision": "delegate",
            "reason": "Needs research and writing",
            "sub_tasks": [
                {"requested_persona": "Researcher", "task_details": "Collect data"},
                {"requested_persona": "Writer", "task_details": "Draft the report"}
            ]
        }"#;
        let Decision::Delegate { sub_tasks, .. } = parse_decision(raw).unwrap() else {
            panic!("expected delegate");
        };
        assert_eq!(sub_tasks.len(), 2);
        assert_eq!(sub_tasks[0].requested_persona, "Researcher");
        assert_eq!(sub_tasks[1].task_details, "Draft the report");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = format!("```json\n{}\n```", EXECUTE);
        assert!(parse_decision(&raw).is_ok());
    }

    #[test]
    fn test_parse_rejections() {
        assert!(matches!(parse_decision("not json"), Err(ValidationError::InvalidJson(_))));
        assert_eq!(parse_decision("[1, 2]"), Err(ValidationError::NotAnObject));
        assert_eq!(
            parse_decision(r#"{"reason": "r"}"#),
            Err(ValidationError::MissingDecision)
        );
        assert_eq!(
            parse_decision(r#"{"decision": "maybe", "reason": "r"}"#),
            Err(ValidationError::InvalidDecision("\"maybe\"".into()))
        );
        assert_eq!(
            parse_decision(r#"{"decision": 7, "reason": "r"}"#),
            Err(ValidationError::InvalidDecision("7".into()))
        );
        assert_eq!(
            parse_decision(r#"{"decision": "execute"}"#),
            Err(ValidationError::MissingReason)
        );
        assert_eq!(
            parse_decision(r#"{"decision": "delegate", "reason": "r"}"#),
            Err(ValidationError::MissingSubTasks)
        );
        assert_eq!(
            parse_decision(r#"{"decision": "delegate", "reason": "r", "sub_tasks": []}"#),
            Err(ValidationError::MissingSubTasks)
        );
        assert!(matches!(
            parse_decision(
                r#"{"decision": "delegate", "reason": "r", "sub_tasks": [{"requested_persona": "x"}]}"#
            ),
            Err(ValidationError::InvalidSubTask { index: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_classify_first_attempt() {
        let client = Arc::new(ScriptedClient::replies(&[EXECUTE]));
        let decision = validator(client.clone())
            .classify("t-1", "Write a tagline", "You are a copywriter.", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(decision.label(), "execute");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(requests[0].timeout, DECISION_TIMEOUT);
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_classify_recovers_with_correction() {
        let client = Arc::new(ScriptedClient::replies(&[
            r#"{"decision": "maybe", "reason": "unsure"}"#,
            EXECUTE,
        ]));
        let decision = validator(client.clone())
            .classify("t-2", "Write a tagline", "You are a copywriter.", &HashMap::new())
            .await
            .unwrap();
        assert_eq!(decision.label(), "execute");

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        let retry_prompt = &requests[1].messages[0].content;
        assert!(retry_prompt.starts_with(&requests[0].messages[0].content));
        assert!(retry_prompt.contains("Your last response failed validation with this error: field `decision` must be"));
    }

    #[tokio::test]
    async fn test_classify_gives_up_after_three_attempts() {
        let client = Arc::new(ScriptedClient::replies(&["not json"]));
        let err = validator(client.clone())
            .classify("t-3", "i", "p", &HashMap::new())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 3);
        assert_eq!(err.kind(), ErrorKind::Decision);
        assert!(matches!(
            err,
            WorkerError::DecisionExhausted { attempts: 3, ref last_error } if last_error.contains("not valid JSON")
        ));
    }

    #[tokio::test]
    async fn test_classify_backend_error_is_terminal() {
        let client = Arc::new(ScriptedClient::new(vec![Scripted::Fail(AiError::Api {
            status: 500,
            message: "overloaded".into(),
        })]));
        let err = validator(client.clone())
            .classify("t-4", "i", "p", &HashMap::new())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 1);
        assert!(matches!(err, WorkerError::DecisionBackend(AiError::Api { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_classify_emits_attempt_events() {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let mut rx = broadcaster.subscribe();
        let client = Arc::new(ScriptedClient::replies(&["{}", EXECUTE]));
        DecisionValidator::new(client, "gpt-4o", broadcaster)
            .classify("t-5", "i", "p", &HashMap::new())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.data["attempt"], 1);
        assert_eq!(first.data["valid"], false);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.data["attempt"], 2);
        assert_eq!(second.data["valid"], true);
    }
}
