//! Variance monitor: pure comparison of actuals against the forecast.
//!
//! Stateless by design. The reforecast attempt counter lives on the
//! workflow aggregate; this service only computes variance and says
//! whether the threshold was breached.

use chrono::Utc;

use crate::domain::models::variance::{VarianceAction, VarianceRecord};

#[derive(Debug, Clone, Copy)]
pub struct VarianceMonitor {
    threshold: f64,
}

impl VarianceMonitor {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate one week. Returns a record with `threshold_exceeded` set
    /// when `|variance| > threshold` (strict: exactly-at-threshold holds).
    pub fn evaluate(&self, week: u32, forecasted_cumulative: f64, actual_cumulative: f64) -> VarianceRecord {
        let variance_pct = variance(forecasted_cumulative, actual_cumulative);
        let threshold_exceeded = variance_pct.abs() > self.threshold;
        VarianceRecord {
            week_number: week,
            forecasted_cumulative,
            actual_cumulative,
            variance_pct,
            threshold_exceeded,
            action_taken: if threshold_exceeded {
                VarianceAction::ReforecastTriggered
            } else {
                VarianceAction::None
            },
            evaluated_at: Utc::now(),
        }
    }
}

/// `(actual - forecast) / forecast`, guarded for a zero forecast: zero
/// when the actuals are also zero, otherwise a full +100% deviation.
fn variance(forecasted: f64, actual: f64) -> f64 {
    if forecasted == 0.0 {
        if actual == 0.0 {
            0.0
        } else {
            1.0
        }
    } else {
        (actual - forecasted) / forecasted
    }
}
