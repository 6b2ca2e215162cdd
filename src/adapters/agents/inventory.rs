//! Built-in inventory allocation agent.
//!
//! Splits the forecasted season total into an initial store allocation and
//! a distribution-center holdback, sized by the holdback percentage.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::artifacts::{DemandForecast, InventoryAllocation};
use crate::domain::models::parameters::ParameterContext;
use crate::domain::ports::agent::{Agent, AgentError, AgentResult, HandoffContext};

pub struct InventoryAgent;

#[async_trait]
impl Agent for InventoryAgent {
    fn name(&self) -> &'static str {
        "inventory"
    }

    async fn invoke(
        &self,
        params: &ParameterContext,
        handoff: &HandoffContext,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let forecast_value = handoff
            .prior_results
            .get("demand")
            .ok_or_else(|| AgentError::Failed("demand forecast missing from handoff".to_string()))?;
        let forecast = DemandForecast::from_value(forecast_value)
            .map_err(|e| AgentError::Failed(e.to_string()))?;

        let holdback = forecast.total_units * params.dc_holdback_pct;
        let planned_shipments = (1..=params.horizon_weeks)
            .filter(|&week| params.replenishment_due(week))
            .count() as u32;

        let allocation = InventoryAllocation {
            initial_allocation_units: forecast.total_units - holdback,
            dc_holdback_units: holdback,
            replenishment_strategy: params.replenishment_strategy.to_string(),
            planned_shipments,
        };

        serde_json::to_value(allocation).map_err(|e| AgentError::Failed(e.to_string()))
    }
}
