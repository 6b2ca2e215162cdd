//! Domain errors for the merchflow orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while driving a workflow.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("Workflow already started: {0}")]
    AlreadyStarted(Uuid),

    #[error("Approval not found: {0}")]
    ApprovalNotFound(Uuid),

    #[error("Approval already resolved: {0}")]
    AlreadyResolved(Uuid),

    #[error("Workflow {workflow_id} is not suspended on approval {approval_id}")]
    ApprovalStateMismatch { workflow_id: Uuid, approval_id: Uuid },

    #[error("Workflow {0} already has a pending approval")]
    ApprovalAlreadyPending(Uuid),

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("Agent '{agent}' failed: {detail}")]
    AgentFailure { agent: String, detail: String },

    #[error("Agent '{agent}' exceeded its {timeout_secs}s invocation bound")]
    AgentTimeout { agent: String, timeout_secs: u64 },

    #[error("Agent '{0}' invocation cancelled")]
    InvocationCancelled(String),

    #[error("Required agent result missing from handoff: {0}")]
    ResultMissing(String),

    #[error("Re-forecast loop exceeded at week {week} after {attempts} attempts")]
    ReforecastLoopExceeded { week: u32, attempts: u32 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
