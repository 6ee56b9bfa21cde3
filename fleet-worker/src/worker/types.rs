use crate::worker::error::{ErrorKind, WorkerError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the caller wants the task handled.
///
/// Raw-JSON generator tasks must be flagged with `DirectJson` explicitly; the
/// persona text is never inspected. Orchestrators that mark such tasks only in
/// the persona prompt get the standard decide-then-execute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Decide between executing and delegating
    #[default]
    Standard,
    /// Skip the decision and return backend JSON verbatim
    DirectJson,
}

impl RequestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::Standard => "standard",
            RequestMode::DirectJson => "direct_json",
        }
    }
}

impl std::fmt::Display for RequestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub persona_prompt: String,
    pub task_instructions: String,
    /// Upstream persona name -> that persona's output
    #[serde(default)]
    pub context_data: HashMap<String, String>,
    #[serde(default)]
    pub can_delegate: bool,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

impl TaskRequest {
    pub fn new(
        task_id: impl Into<String>,
        persona_prompt: impl Into<String>,
        task_instructions: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            persona_prompt: persona_prompt.into(),
            task_instructions: task_instructions.into(),
            context_data: HashMap::new(),
            can_delegate: false,
            mode: RequestMode::Standard,
            deadline_secs: None,
        }
    }

    pub fn with_context(mut self, persona: impl Into<String>, output: impl Into<String>) -> Self {
        self.context_data.insert(persona.into(), output.into());
        self
    }

    pub fn with_delegation(mut self, can_delegate: bool) -> Self {
        self.can_delegate = can_delegate;
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_deadline(mut self, secs: u64) -> Self {
        self.deadline_secs = Some(secs);
        self
    }

    /// Upstream outputs are present, so this call combines them and must not
    /// split the task again.
    pub fn is_synthesis(&self) -> bool {
        !self.context_data.is_empty()
    }

    /// Context personas in stable order
    pub fn context_personas(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.context_data.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn persona_preview(&self) -> String {
        self.persona_prompt.chars().take(100).collect()
    }
}

/// One entry of a delegate decision as proposed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTaskSpec {
    pub requested_persona: String,
    pub task_details: String,
}

/// Structured verdict for one task. A `Delegate` always carries at least one
/// sub-task; the validator refuses to build one otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Execute {
        reason: String,
    },
    Delegate {
        reason: String,
        sub_tasks: Vec<SubTaskSpec>,
    },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Execute { .. } => "execute",
            Decision::Delegate { .. } => "delegate",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Execute { reason } | Decision::Delegate { reason, .. } => reason,
        }
    }
}

/// Outbound unit of work for a sibling worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub requested_persona: String,
    pub task_details: String,
}

impl From<SubTaskSpec> for SubTask {
    fn from(spec: SubTaskSpec) -> Self {
        Self {
            requested_persona: spec.requested_persona,
            task_details: spec.task_details,
        }
    }
}

/// The only value that crosses the call boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default)]
    pub final_content: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub sub_tasks: Vec<SubTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl TaskResult {
    pub fn content(task_id: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        debug_assert!(!content.is_empty(), "successful result needs content");
        Self {
            task_id: task_id.into(),
            success: true,
            final_content: content,
            error_message: String::new(),
            sub_tasks: Vec::new(),
            error_kind: None,
        }
    }

    pub fn delegated(task_id: impl Into<String>, sub_tasks: Vec<SubTask>) -> Self {
        debug_assert!(!sub_tasks.is_empty(), "delegated result needs sub-tasks");
        Self {
            task_id: task_id.into(),
            success: true,
            final_content: String::new(),
            error_message: String::new(),
            sub_tasks,
            error_kind: None,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: &WorkerError) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            final_content: String::new(),
            error_message: error.to_string(),
            sub_tasks: Vec::new(),
            error_kind: Some(error.kind()),
        }
    }

    /// Exactly one payload on success, an error message otherwise.
    pub fn is_well_formed(&self) -> bool {
        if self.success {
            self.error_message.is_empty()
                && self.error_kind.is_none()
                && (self.final_content.is_empty() != self.sub_tasks.is_empty())
        } else {
            !self.error_message.is_empty()
                && self.error_kind.is_some()
                && self.final_content.is_empty()
                && self.sub_tasks.is_empty()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    DirectGeneration,
    Deciding,
    Executing,
    Delegating,
    Completed,
    Failed,
}

impl DispatchState {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchState::Received => "received",
            DispatchState::DirectGeneration => "direct_generation",
            DispatchState::Deciding => "deciding",
            DispatchState::Executing => "executing",
            DispatchState::Delegating => "delegating",
            DispatchState::Completed => "completed",
            DispatchState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchState::Completed | DispatchState::Failed)
    }

    /// Any live state may fail; everything else follows the dispatch graph.
    pub fn can_transition_to(&self, next: DispatchState) -> bool {
        use DispatchState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Received, DirectGeneration) | (Received, Deciding) => true,
            (DirectGeneration, Completed) => true,
            (Deciding, Executing) | (Deciding, Delegating) => true,
            (Executing, Completed) | (Delegating, Completed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
