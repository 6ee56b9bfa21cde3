use crate::worker::error::WorkerError;
use crate::worker::types::{SubTask, SubTaskSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationOutcome {
    /// Hand these to sibling workers, in order
    SubTasks(Vec<SubTask>),
    /// Caller did not grant delegation; run the original task instead
    Downgraded,
}

/// Turns a delegate decision into outbound sub-tasks, applying the caller's
/// delegation permission first.
pub struct DelegationBuilder;

impl DelegationBuilder {
    pub fn build(
        sub_tasks: Vec<SubTaskSpec>,
        can_delegate: bool,
    ) -> Result<DelegationOutcome, WorkerError> {
        if !can_delegate {
            return Ok(DelegationOutcome::Downgraded);
        }
        if sub_tasks.is_empty() {
            return Err(WorkerError::EmptyDelegation);
        }
        Ok(DelegationOutcome::SubTasks(
            sub_tasks.into_iter().map(SubTask::from).collect(),
        ))
    }
}
