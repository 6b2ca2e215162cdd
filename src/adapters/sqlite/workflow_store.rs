//! SQLite implementation of the `WorkflowStore` port.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::workflow::{Workflow, WorkflowState};
use crate::domain::ports::store::WorkflowStore;

#[derive(Clone)]
pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn save(&self, workflow: &Workflow) -> DomainResult<()> {
        let row = WorkflowRow::from_workflow(workflow)?;

        sqlx::query(
            "INSERT INTO workflows (id, state_kind, terminal, current_week, reforecast_attempts,
                parameters_json, state_json, pending_approval_json, results_json, history_json,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.state_kind)
        .bind(row.terminal)
        .bind(row.current_week)
        .bind(row.reforecast_attempts)
        .bind(&row.parameters_json)
        .bind(&row.state_json)
        .bind(&row.pending_approval_json)
        .bind(&row.results_json)
        .bind(&row.history_json)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> DomainResult<()> {
        let row = WorkflowRow::from_workflow(workflow)?;

        let result = sqlx::query(
            "UPDATE workflows SET state_kind = ?, terminal = ?, current_week = ?,
                reforecast_attempts = ?, state_json = ?, pending_approval_json = ?,
                results_json = ?, history_json = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&row.state_kind)
        .bind(row.terminal)
        .bind(row.current_week)
        .bind(row.reforecast_attempts)
        .bind(&row.state_json)
        .bind(&row.pending_approval_json)
        .bind(&row.results_json)
        .bind(&row.history_json)
        .bind(&row.updated_at)
        .bind(&row.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::WorkflowNotFound(workflow.id));
        }

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Workflow>> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            "SELECT id, state_kind, terminal, current_week, reforecast_attempts,
                parameters_json, state_json, pending_approval_json, results_json, history_json,
                created_at, updated_at
             FROM workflows WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowRow::try_into_workflow).transpose()
    }

    async fn list_active(&self) -> DomainResult<Vec<Workflow>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            "SELECT id, state_kind, terminal, current_week, reforecast_attempts,
                parameters_json, state_json, pending_approval_json, results_json, history_json,
                created_at, updated_at
             FROM workflows WHERE terminal = 0 ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowRow::try_into_workflow).collect()
    }
}

// ============================================================================
// Row type for sqlx
// ============================================================================

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    state_kind: String,
    terminal: i64,
    current_week: i64,
    reforecast_attempts: i64,
    parameters_json: String,
    state_json: String,
    pending_approval_json: Option<String>,
    results_json: String,
    history_json: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_workflow(workflow: &Workflow) -> DomainResult<Self> {
        Ok(Self {
            id: workflow.id.to_string(),
            state_kind: workflow.state.label().to_string(),
            terminal: i64::from(workflow.state.is_terminal()),
            current_week: i64::from(workflow.current_week),
            reforecast_attempts: i64::from(workflow.reforecast_attempts),
            parameters_json: serde_json::to_string(&workflow.parameters)?,
            state_json: serde_json::to_string(&workflow.state)?,
            pending_approval_json: workflow
                .pending_approval
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            results_json: serde_json::to_string(&workflow.results)?,
            history_json: serde_json::to_string(&workflow.history)?,
            created_at: workflow.created_at.to_rfc3339(),
            updated_at: workflow.updated_at.to_rfc3339(),
        })
    }

    fn try_into_workflow(self) -> DomainResult<Workflow> {
        let state: WorkflowState = serde_json::from_str(&self.state_json)?;

        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            parameters: serde_json::from_str(&self.parameters_json)?,
            state,
            current_week: u32::try_from(self.current_week)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            reforecast_attempts: u32::try_from(self.reforecast_attempts)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?,
            pending_approval: self
                .pending_approval_json
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            results: serde_json::from_str(&self.results_json)?,
            history: serde_json::from_str(&self.history_json)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}
