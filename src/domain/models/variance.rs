//! Weekly forecast-vs-actual variance records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the orchestrator did in response to a variance evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceAction {
    None,
    ReforecastTriggered,
}

/// One immutable variance evaluation, written once per monitored week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceRecord {
    pub week_number: u32,
    pub forecasted_cumulative: f64,
    pub actual_cumulative: f64,
    /// `(actual - forecast) / forecast`.
    pub variance_pct: f64,
    pub threshold_exceeded: bool,
    pub action_taken: VarianceAction,
    pub evaluated_at: DateTime<Utc>,
}
