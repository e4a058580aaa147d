//! Error kinds surfaced by the core, and their process exit codes.
//!
//! Propagation policy is fail-local, surface-global: no error tears down
//! another component. An error is either refused synchronously to the
//! caller (state transitions, registration) or published as a bus event
//! (executor/scheduler/handler failures) so the decision layer can react.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::controller::MacroState,
        to: crate::controller::MacroState,
    },

    #[error("unknown key identifier: {0}")]
    UnknownKey(String),

    #[error("hook registration failed for key {key}: {reason}")]
    HookRegistrationFailed { key: String, reason: String },

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error("executor action failed: {0}")]
    ExecutorActionFailed(String),

    #[error("scheduler callback failed for task {task_id}: {reason}")]
    SchedulerCallbackFailed { task_id: String, reason: String },

    #[error("bus handler failed on topic {topic}: {cause}")]
    BusHandlerFailed { topic: String, cause: String },
}

impl CoreError {
    /// Maps onto the exit-code table of the external interface. Errors that
    /// never reach the process boundary (they're isolated and published as
    /// events instead) still get a code for completeness and for the CLI's
    /// own direct-call sites (e.g. `register` from `main`).
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::InvalidTransition { .. } => 1,
            CoreError::UnknownKey(_) => 2,
            CoreError::HookRegistrationFailed { .. } => 3,
            CoreError::DuplicateTaskId(_) => 4,
            CoreError::ShutdownInProgress => 5,
            CoreError::ExecutorActionFailed(_)
            | CoreError::SchedulerCallbackFailed { .. }
            | CoreError::BusHandlerFailed { .. } => 1,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
