//! Agent port: the uniform handoff contract over the three computation agents.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::models::parameters::ParameterContext;

/// Errors an agent implementation may report.
///
/// `Transient` is retried by the handoff adapter before surfacing; the
/// orchestrator itself never retries. Timeouts are imposed by the adapter,
/// not reported by agents.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent reported failure: {0}")]
    Failed(String),

    #[error("transient agent error: {0}")]
    Transient(String),

    #[error("agent invocation cancelled")]
    Cancelled,
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Context handed to an agent: prior agent results plus observed actuals.
#[derive(Debug, Clone, Default)]
pub struct HandoffContext {
    /// Latest result per upstream agent, keyed by agent name.
    pub prior_results: BTreeMap<String, serde_json::Value>,
    /// Cumulative actual sales through `current_week`, when observed.
    pub actuals_cumulative: Option<f64>,
    /// Week the invocation relates to; 0 before monitoring starts.
    pub current_week: u32,
}

/// One interchangeable computation agent (demand, inventory, pricing).
///
/// The orchestrator does not care whether the implementation is a real
/// model or a stub; it only requires this contract plus the bounded
/// invocation time the handoff adapter enforces.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the agent to completion, honoring the cancellation token.
    async fn invoke(
        &self,
        params: &ParameterContext,
        handoff: &HandoffContext,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value>;
}
