//! Typed payloads exchanged across the agent handoff boundary.
//!
//! Agents return `serde_json::Value`; these structs give the orchestrator
//! and the built-in agents a shared shape to serialize into and out of.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Output of the demand agent: a per-week unit forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    /// Forecasted units per week, index 0 = week 1.
    pub weekly_units: Vec<f64>,
    pub total_units: f64,
    pub method: String,
}

impl DemandForecast {
    /// Cumulative forecasted units through the given week (1-based).
    pub fn cumulative_through(&self, week: u32) -> f64 {
        self.weekly_units
            .iter()
            .take(week as usize)
            .sum()
    }

    /// Deserialize from a stored agent result.
    pub fn from_value(value: &serde_json::Value) -> DomainResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DomainError::SerializationError(format!("demand forecast: {}", e)))
    }
}

/// Output of the inventory agent: the holdback split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryAllocation {
    pub initial_allocation_units: f64,
    pub dc_holdback_units: f64,
    pub replenishment_strategy: String,
    /// Planned holdback shipments over the season (0 when strategy is none).
    pub planned_shipments: u32,
}

impl InventoryAllocation {
    pub fn from_value(value: &serde_json::Value) -> DomainResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| DomainError::SerializationError(format!("inventory allocation: {}", e)))
    }

    /// Units per holdback shipment, zero when nothing is planned.
    pub fn units_per_shipment(&self) -> f64 {
        if self.planned_shipments == 0 {
            0.0
        } else {
            self.dc_holdback_units / f64::from(self.planned_shipments)
        }
    }
}

/// Output of the pricing agent at the markdown checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkdownRecommendation {
    pub checkpoint_week: u32,
    /// Actual cumulative units sold over forecasted cumulative units.
    pub sell_through: f64,
    pub markdown_recommended: bool,
    pub markdown_pct: f64,
}
