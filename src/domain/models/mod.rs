//! Domain models for the merchflow orchestrator.

pub mod approval;
pub mod artifacts;
pub mod config;
pub mod parameters;
pub mod plan;
pub mod variance;
pub mod workflow;

pub use approval::{ApprovalDecision, ApprovalKind, ApprovalRequest, ApprovalStatus};
pub use artifacts::{DemandForecast, InventoryAllocation, MarkdownRecommendation};
pub use config::{
    AgentsConfig, Config, DatabaseConfig, LoggingConfig, OrchestratorConfig, RetryConfig,
};
pub use parameters::{ParameterContext, ReplenishmentStrategy};
pub use plan::{ExecutionPlan, PlanSkip, PlanStep};
pub use variance::{VarianceAction, VarianceRecord};
pub use workflow::{
    AgentInvocation, HistoryEntry, InvocationStatus, StateTransition, Workflow, WorkflowState,
};
