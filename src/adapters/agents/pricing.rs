//! Built-in markdown pricing agent.
//!
//! Compares sell-through at the checkpoint week against the configured
//! threshold and sizes a markdown proportional to the shortfall.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::artifacts::{DemandForecast, MarkdownRecommendation};
use crate::domain::models::parameters::ParameterContext;
use crate::domain::ports::agent::{Agent, AgentError, AgentResult, HandoffContext};

pub struct PricingAgent;

#[async_trait]
impl Agent for PricingAgent {
    fn name(&self) -> &'static str {
        "pricing"
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

        let threshold = params
            .markdown_threshold
            .ok_or_else(|| AgentError::Failed("markdown_threshold not configured".to_string()))?;
        let forecast_value = handoff
            .prior_results
            .get("demand")
            .ok_or_else(|| AgentError::Failed("demand forecast missing from handoff".to_string()))?;
        let forecast = DemandForecast::from_value(forecast_value)
            .map_err(|e| AgentError::Failed(e.to_string()))?;
        let actuals = handoff
            .actuals_cumulative
            .ok_or_else(|| AgentError::Failed("actuals missing from handoff".to_string()))?;

        let forecasted = forecast.cumulative_through(handoff.current_week);
        let sell_through = if forecasted > 0.0 { actuals / forecasted } else { 0.0 };

        let markdown_recommended = sell_through < threshold;
        let markdown_pct = if markdown_recommended {
            // Deeper markdown the further the shortfall, capped at 40%.
            ((threshold - sell_through) / threshold * 0.5).min(0.40)
        } else {
            0.0
        };

        let recommendation = MarkdownRecommendation {
            checkpoint_week: handoff.current_week,
            sell_through: (sell_through * 10_000.0).round() / 10_000.0,
            markdown_recommended,
            markdown_pct: (markdown_pct * 10_000.0).round() / 10_000.0,
        };

        serde_json::to_value(recommendation).map_err(|e| AgentError::Failed(e.to_string()))
    }
}
