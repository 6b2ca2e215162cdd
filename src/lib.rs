//! Merchflow - Retail Season Planning Workflow Orchestrator
//!
//! Merchflow drives a retail demand-forecasting season through a persistent
//! state machine: demand forecast, manufacturing approval, inventory
//! allocation, weekly variance monitoring with bounded reforecast loops,
//! and an optional markdown checkpoint with its own approval gate.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, ports, and the state machine types
//! - **Service Layer** (`services`): The orchestrator and its collaborators
//! - **Adapter Layer** (`adapters`): SQLite store, built-in agents, actuals feeds
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use merchflow::services::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Assemble store, agents, and publisher, then start workflows.
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ApprovalDecision, ApprovalKind, ApprovalRequest, Config, DemandForecast, ExecutionPlan,
    HistoryEntry, InventoryAllocation, MarkdownRecommendation, ParameterContext,
    ReplenishmentStrategy, VarianceRecord, Workflow, WorkflowState,
};
pub use services::{HandoffAdapter, Orchestrator, StatusEvent, StatusEventKind, StatusPublisher};
