use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types for task lifecycle broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    TaskReceived,
    TaskStateChange,
    DecisionAttempt,
    TaskCompleted,
    TaskFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskReceived => "task.received",
            Self::TaskStateChange => "task.state_change",
            Self::DecisionAttempt => "task.decision_attempt",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

/// JSON-RPC request from a fleet orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: String, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: String, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }
}

/// Server-push event to every connected observer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub event: String,
    pub timestamp: String,
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            type_: "event".to_string(),
            event: event.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    pub fn task_received(
        task_id: &str,
        mode: &str,
        can_delegate: bool,
        context_personas: &[&str],
    ) -> Self {
        Self::new(
            EventType::TaskReceived,
            serde_json::json!({
                "task_id": task_id,
                "mode": mode,
                "can_delegate": can_delegate,
                "context_personas": context_personas
            }),
        )
    }

    pub fn task_state_change(task_id: &str, from: &str, to: &str) -> Self {
        Self::new(
            EventType::TaskStateChange,
            serde_json::json!({
                "task_id": task_id,
                "from": from,
                "to": to
            }),
        )
    }

    /// One classification attempt; `error` is set when the reply failed validation
    pub fn decision_attempt(
        task_id: &str,
        attempt: u32,
        max_attempts: u32,
        error: Option<&str>,
    ) -> Self {
        Self::new(
            EventType::DecisionAttempt,
            serde_json::json!({
                "task_id": task_id,
                "attempt": attempt,
                "max_attempts": max_attempts,
                "valid": error.is_none(),
                "error": error
            }),
        )
    }

    pub fn task_completed(task_id: &str, outcome: &str, sub_task_count: usize, elapsed_ms: u128) -> Self {
        Self::new(
            EventType::TaskCompleted,
            serde_json::json!({
                "task_id": task_id,
                "outcome": outcome,
                "sub_task_count": sub_task_count,
                "elapsed_ms": elapsed_ms as u64
            }),
        )
    }

    pub fn task_failed(task_id: &str, error_kind: &str, error: &str, elapsed_ms: u128) -> Self {
        Self::new(
            EventType::TaskFailed,
            serde_json::json!({
                "task_id": task_id,
                "error_kind": error_kind,
                "error": error,
                "elapsed_ms": elapsed_ms as u64
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(EventType::TaskReceived.to_string(), "task.received");
        assert_eq!(String::from(EventType::TaskFailed), "task.failed");
    }

    #[test]
    fn test_event_envelope() {
        let event = GatewayEvent::task_state_change("t-1", "received", "deciding");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["event"], "task.state_change");
        assert_eq!(json["data"]["to"], "deciding");
        assert!(json["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_decision_attempt_payload() {
        let ok = GatewayEvent::decision_attempt("t-1", 1, 3, None);
        assert_eq!(ok.data["valid"], true);
        assert!(ok.data["error"].is_null());

        let bad = GatewayEvent::decision_attempt("t-1", 2, 3, Some("bad decision"));
        assert_eq!(bad.data["valid"], false);
        assert_eq!(bad.data["attempt"], 2);
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(RpcError::parse_error().code, -32700);
        assert_eq!(RpcError::method_not_found().code, -32601);
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::internal_error("x").code, -32603);

        let resp = RpcResponse::error("1".into(), RpcError::method_not_found());
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["error"]["message"], "Method not found");
    }
}
