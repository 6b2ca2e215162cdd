//! Built-in demand forecasting agent.
//!
//! Produces a deterministic seasonal curve so runs are reproducible. On
//! reforecast (actuals available mid-season) it rescales the forecast so the
//! cumulative through the current week matches what was actually sold.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::artifacts::DemandForecast;
use crate::domain::models::parameters::ParameterContext;
use crate::domain::ports::agent::{Agent, AgentError, AgentResult, HandoffContext};

const UNITS_PER_WEEK_BASELINE: f64 = 1000.0;

pub struct DemandAgent;

impl DemandAgent {
    /// Seasonal bell curve summing to `horizon * 1000` units.
    fn baseline(params: &ParameterContext) -> DemandForecast {
        let horizon = params.horizon_weeks as usize;
        let weights: Vec<f64> = (0..horizon)
            .map(|i| {
                let phase = std::f64::consts::PI * (i as f64 + 0.5) / horizon as f64;
                1.0 + 0.35 * phase.sin()
            })
            .collect();
        let weight_sum: f64 = weights.iter().sum();
        let total = UNITS_PER_WEEK_BASELINE * horizon as f64;

        let weekly_units: Vec<f64> = weights
            .iter()
            .map(|w| (w / weight_sum * total * 100.0).round() / 100.0)
            .collect();
        let total_units = weekly_units.iter().sum();

        DemandForecast {
            weekly_units,
            total_units,
            method: "seasonal_baseline".to_string(),
        }
    }

    /// Scale a prior forecast so its cumulative through `week` equals the
    /// observed actuals, carrying the same ratio into the remaining weeks.
    fn rescale(prior: &DemandForecast, week: u32, actuals_cumulative: f64) -> DemandForecast {
        let prior_cumulative = prior.cumulative_through(week);
        let ratio = if prior_cumulative > 0.0 {
            actuals_cumulative / prior_cumulative
        } else {
            1.0
        };

        let weekly_units: Vec<f64> = prior
            .weekly_units
            .iter()
            .map(|u| (u * ratio * 100.0).round() / 100.0)
            .collect();
        let total_units = weekly_units.iter().sum();

        DemandForecast {
            weekly_units,
            total_units,
            method: "variance_rescale".to_string(),
        }
    }
}

#[async_trait]
impl Agent for DemandAgent {
    fn name(&self) -> &'static str {
        "demand"
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

        let forecast = match (handoff.actuals_cumulative, handoff.prior_results.get(self.name())) {
            (Some(actuals), Some(prior_value)) if handoff.current_week > 0 => {
                let prior = DemandForecast::from_value(prior_value)
                    .map_err(|e| AgentError::Failed(e.to_string()))?;
                Self::rescale(&prior, handoff.current_week, actuals)
            }
            _ => Self::baseline(params),
        };

        serde_json::to_value(forecast).map_err(|e| AgentError::Failed(e.to_string()))
    }
}
