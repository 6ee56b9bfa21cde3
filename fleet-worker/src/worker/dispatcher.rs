use crate::ai::CompletionClient;
use crate::config::Config;
use crate::gateway::events::EventBroadcaster;
use crate::gateway::protocol::GatewayEvent;
use crate::worker::delegation::{DelegationBuilder, DelegationOutcome};
use crate::worker::error::WorkerError;
use crate::worker::executor::TaskExecutor;
use crate::worker::fault;
use crate::worker::types::{Decision, DispatchState, RequestMode, SubTask, TaskRequest, TaskResult};
use crate::worker::validator::DecisionValidator;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

enum TaskOutcome {
    Content(String),
    Delegated(Vec<SubTask>),
}

/// Current state of one call, published on every transition.
struct StateTracker<'a> {
    task_id: &'a str,
    state: Mutex<DispatchState>,
    broadcaster: &'a EventBroadcaster,
}

impl<'a> StateTracker<'a> {
    fn new(task_id: &'a str, broadcaster: &'a EventBroadcaster) -> Self {
        Self {
            task_id,
            state: Mutex::new(DispatchState::Received),
            broadcaster,
        }
    }

    fn current(&self) -> DispatchState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, next: DispatchState) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let previous = *state;
            *state = next;
            previous
        };
        if !previous.can_transition_to(next) {
            log::warn!(
                "[DISPATCHER] Task {}: Unexpected transition {} -> {}",
                self.task_id,
                previous,
                next
            );
        }
        log::debug!("[DISPATCHER] Task {}: {} -> {}", self.task_id, previous, next);
        self.broadcaster.broadcast(GatewayEvent::task_state_change(
            self.task_id,
            previous.label(),
            next.label(),
        ));
    }
}

/// Runs one task end to end and always answers with a `TaskResult`.
pub struct TaskDispatcher {
    config: Config,
    validator: DecisionValidator,
    executor: TaskExecutor,
    broadcaster: Arc<EventBroadcaster>,
}

impl TaskDispatcher {
    pub fn new(
        config: Config,
        client: Arc<dyn CompletionClient>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        fault::install_panic_capture();
        Self {
            validator: DecisionValidator::new(
                Arc::clone(&client),
                config.decision_model.clone(),
                Arc::clone(&broadcaster),
            ),
            executor: TaskExecutor::new(
                client,
                config.execution_model.clone(),
                config.direct_json_model.clone(),
            ),
            config,
            broadcaster,
        }
    }

    pub async fn execute_task(&self, request: TaskRequest) -> TaskResult {
        self.execute_task_with_cancel(request, CancellationToken::new()).await
    }

    /// Like `execute_task`, but gives up with a `cancelled` result as soon as
    /// `cancel` fires.
    pub async fn execute_task_with_cancel(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> TaskResult {
        let started = Instant::now();
        let task_id = request.task_id.as_str();

        log::info!(
            "[DISPATCHER] Task {}: Received (mode: {}, can_delegate: {}, persona: {})",
            task_id,
            request.mode,
            request.can_delegate,
            request.persona_preview()
        );
        self.broadcaster.broadcast(GatewayEvent::task_received(
            task_id,
            request.mode.as_str(),
            request.can_delegate,
            &request.context_personas(),
        ));

        let tracker = StateTracker::new(task_id, &self.broadcaster);
        let deadline = request.deadline_secs.or(self.config.default_deadline_secs);

        let guarded = async {
            match AssertUnwindSafe(self.run(&request, &tracker)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(fault::into_fault(payload)),
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WorkerError::Cancelled),
            result = with_deadline(deadline, guarded) => result,
        };

        let elapsed = started.elapsed();
        let result = match result {
            Ok(outcome) => {
                tracker.advance(DispatchState::Completed);
                self.finish_success(task_id, outcome, elapsed)
            }
            Err(error) => {
                log::error!(
                    "[DISPATCHER] Task {}: Failed while {} ({}) after {:.2}s: {}",
                    task_id,
                    tracker.current(),
                    error.kind(),
                    elapsed.as_secs_f64(),
                    error
                );
                tracker.advance(DispatchState::Failed);
                self.broadcaster.broadcast(GatewayEvent::task_failed(
                    task_id,
                    error.kind().as_ref(),
                    &error.to_string(),
                    elapsed.as_millis(),
                ));
                TaskResult::failure(task_id, &error)
            }
        };
        debug_assert!(result.is_well_formed());
        result
    }

    fn finish_success(&self, task_id: &str, outcome: TaskOutcome, elapsed: Duration) -> TaskResult {
        match outcome {
            TaskOutcome::Content(content) => {
                log::info!(
                    "[DISPATCHER] Task {}: Completed execution in {:.2}s",
                    task_id,
                    elapsed.as_secs_f64()
                );
                self.broadcaster.broadcast(GatewayEvent::task_completed(
                    task_id,
                    "content",
                    0,
                    elapsed.as_millis(),
                ));
                TaskResult::content(task_id, content)
            }
            TaskOutcome::Delegated(sub_tasks) => {
                log::info!(
                    "[DISPATCHER] Task {}: Delegated {} sub-tasks in {:.2}s",
                    task_id,
                    sub_tasks.len(),
                    elapsed.as_secs_f64()
                );
                self.broadcaster.broadcast(GatewayEvent::task_completed(
                    task_id,
                    "delegated",
                    sub_tasks.len(),
                    elapsed.as_millis(),
                ));
                TaskResult::delegated(task_id, sub_tasks)
            }
        }
    }

    async fn run(
        &self,
        request: &TaskRequest,
        tracker: &StateTracker<'_>,
    ) -> Result<TaskOutcome, WorkerError> {
        let task_id = request.task_id.as_str();

        if request.mode == RequestMode::DirectJson {
            tracker.advance(DispatchState::DirectGeneration);
            self.config.require_credential()?;
            let content = self
                .executor
                .generate_json(task_id, &request.persona_prompt, &request.task_instructions)
                .await?;
            return Ok(TaskOutcome::Content(content));
        }

        tracker.advance(DispatchState::Deciding);
        self.config.require_credential()?;

        let decision = self
            .validator
            .classify(
                task_id,
                &request.task_instructions,
                &request.persona_prompt,
                &request.context_data,
            )
            .await?;
        log::info!(
            "[DISPATCHER] Task {}: Decision = {} ({})",
            task_id,
            decision.label(),
            decision.reason()
        );

        match decision {
            Decision::Execute { .. } => self.execute(request, tracker).await,
            Decision::Delegate { sub_tasks, .. } => {
                // Synthesis never re-decomposes, whatever the caller allows.
                let may_delegate = request.can_delegate && !request.is_synthesis();
                if may_delegate {
                    tracker.advance(DispatchState::Delegating);
                }
                match DelegationBuilder::build(sub_tasks, may_delegate)? {
                    DelegationOutcome::Downgraded => {
                        if request.is_synthesis() {
                            log::warn!(
                                "[DISPATCHER] Task {}: Delegate decision on a synthesis call, executing instead",
                                task_id
                            );
                        } else {
                            log::warn!(
                                "[DISPATCHER] Task {}: Delegation not permitted, executing directly",
                                task_id
                            );
                        }
                        self.execute(request, tracker).await
                    }
                    DelegationOutcome::SubTasks(sub_tasks) => Ok(TaskOutcome::Delegated(sub_tasks)),
                }
            }
        }
    }

    async fn execute(
        &self,
        request: &TaskRequest,
        tracker: &StateTracker<'_>,
    ) -> Result<TaskOutcome, WorkerError> {
        tracker.advance(DispatchState::Executing);
        let content = self
            .executor
            .execute(
                &request.task_id,
                &request.persona_prompt,
                &request.task_instructions,
                &request.context_data,
            )
            .await?;
        Ok(TaskOutcome::Content(content))
    }
}

async fn with_deadline<F>(deadline_secs: Option<u64>, fut: F) -> Result<TaskOutcome, WorkerError>
where
    F: Future<Output = Result<TaskOutcome, WorkerError>>,
{
    match deadline_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .unwrap_or(Err(WorkerError::Timeout(secs))),
        None => fut.await,
    }
}
