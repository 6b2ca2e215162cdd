//! Port trait definitions (hexagonal architecture).
//!
//! Async trait interfaces that adapters implement:
//! - `Agent`: the uniform handoff contract over the computation agents
//! - `ActualsFeed`: weekly observed-sales source
//! - `WorkflowStore`: durable workflow persistence

pub mod actuals;
pub mod agent;
pub mod store;

pub use actuals::ActualsFeed;
pub use agent::{Agent, AgentError, AgentResult, HandoffContext};
pub use store::WorkflowStore;
