//! Task worker for a multi-agent fleet
//!
//! Each call receives one task plus a persona and answers with exactly one
//! `TaskResult`. The worker either does the work itself or splits it into
//! sub-tasks for sibling workers; it never schedules those sub-tasks.
//!
//! ## Flow
//!
//! ```text
//!                      ┌─ direct_json ─→ DirectGeneration ──────────────┐
//! Request → Received ──┤                                                ├─→ Completed
//!                      └─ standard ───→ Deciding ─┬─ execute ─→ Executing ┤
//!                                                 └─ delegate ─→ Delegating┘
//!
//! Any state ──(error, deadline, cancel, panic)──→ Failed
//! ```
//!
//! ## Decision retries
//!
//! The decision reply must be a JSON object that validates into a
//! [`types::Decision`]. Up to three attempts are made; each failed attempt appends
//! the validation error to the prompt as a correction. Provider errors end
//! the call immediately.
//!
//! ## Delegation policy
//!
//! A `delegate` decision without the caller's permission is downgraded: the
//! proposed plan is discarded and the original instructions run under the
//! original persona.
//!
//! ## Synthesis
//!
//! When context data from upstream personas is present, the decision prompt
//! tells the backend to execute. A `delegate` that comes back anyway is
//! overridden to execute, even with delegation permitted. The execution
//! prompt carries the upstream outputs ahead of the task.

pub mod delegation;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod fault;
pub mod prompts;
pub mod types;
pub mod validator;

pub use dispatcher::TaskDispatcher;
pub use types::{TaskRequest, TaskResult};
