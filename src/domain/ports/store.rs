//! Workflow store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::workflow::Workflow;

/// Durable record of workflows, sufficient to resume after a restart.
///
/// The orchestrator persists through this port before every step boundary;
/// implementations must make `get` return exactly what `save`/`update`
/// last wrote.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a newly created workflow.
    async fn save(&self, workflow: &Workflow) -> DomainResult<()>;

    /// Persist the current state of an existing workflow.
    async fn update(&self, workflow: &Workflow) -> DomainResult<()>;

    /// Load a workflow by id.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Workflow>>;

    /// All workflows not yet in a terminal state, for restart recovery.
    async fn list_active(&self) -> DomainResult<Vec<Workflow>>;
}
