//! Season parameters: the immutable, validated input that shapes a workflow.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// How distribution-center holdback is released over the season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplenishmentStrategy {
    /// Ship everything up front; no weekly replenishment steps.
    None,
    /// Dispatch a holdback shipment every week.
    Weekly,
    /// Dispatch a holdback shipment every other week.
    Biweekly,
}

impl std::fmt::Display for ReplenishmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Weekly => write!(f, "weekly"),
            Self::Biweekly => write!(f, "biweekly"),
        }
    }
}

/// Validated snapshot of the five season parameters.
///
/// Created once at workflow start and never mutated; every component reads
/// it, only the workflow owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterContext {
    pub horizon_weeks: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub replenishment_strategy: ReplenishmentStrategy,
    pub dc_holdback_pct: f64,
    pub markdown_checkpoint_week: Option<u32>,
    pub markdown_threshold: Option<f64>,
}

impl ParameterContext {
    /// Validate and construct a parameter context.
    ///
    /// Rejects a non-positive horizon, `end <= start`, an out-of-range
    /// holdback or threshold, a checkpoint week outside `[1, horizon]`, and
    /// a markdown checkpoint/threshold pair where only one side is set.
    pub fn new(
        horizon_weeks: u32,
        start_date: NaiveDate,
        end_date: NaiveDate,
        replenishment_strategy: ReplenishmentStrategy,
        dc_holdback_pct: f64,
        markdown_checkpoint_week: Option<u32>,
        markdown_threshold: Option<f64>,
    ) -> DomainResult<Self> {
        if horizon_weeks == 0 {
            return Err(DomainError::InvalidParameters(
                "horizon_weeks must be greater than zero".to_string(),
            ));
        }
        if end_date <= start_date {
            return Err(DomainError::InvalidParameters(format!(
                "end_date {} must be after start_date {}",
                end_date, start_date
            )));
        }
        if !(0.0..=1.0).contains(&dc_holdback_pct) {
            return Err(DomainError::InvalidParameters(format!(
                "dc_holdback_pct {} must be within [0, 1]",
                dc_holdback_pct
            )));
        }
        match (markdown_checkpoint_week, markdown_threshold) {
            (Some(week), Some(threshold)) => {
                if week == 0 || week > horizon_weeks {
                    return Err(DomainError::InvalidParameters(format!(
                        "markdown_checkpoint_week {} must be within [1, {}]",
                        week, horizon_weeks
                    )));
                }
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(DomainError::InvalidParameters(format!(
                        "markdown_threshold {} must be within [0, 1]",
                        threshold
                    )));
                }
            }
            (None, None) => {}
            _ => {
                return Err(DomainError::InvalidParameters(
                    "markdown_checkpoint_week and markdown_threshold must both be set or both be absent"
                        .to_string(),
                ));
            }
        }

        Ok(Self {
            horizon_weeks,
            start_date,
            end_date,
            replenishment_strategy,
            dc_holdback_pct,
            markdown_checkpoint_week,
            markdown_threshold,
        })
    }

    /// Whether a replenishment shipment is due in the given week.
    pub fn replenishment_due(&self, week: u32) -> bool {
        match self.replenishment_strategy {
            ReplenishmentStrategy::None => false,
            ReplenishmentStrategy::Weekly => true,
            ReplenishmentStrategy::Biweekly => week % 2 == 0,
        }
    }

    /// Whether the markdown checkpoint falls on the given week.
    pub fn markdown_checkpoint_at(&self, week: u32) -> bool {
        self.markdown_checkpoint_week == Some(week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn valid() -> DomainResult<ParameterContext> {
        ParameterContext::new(
            12,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::Weekly,
            0.45,
            Some(6),
            Some(0.60),
        )
    }

    #[test]
    fn test_valid_parameters() {
        let params = valid().unwrap();
        assert_eq!(params.horizon_weeks, 12);
        assert!(params.markdown_checkpoint_at(6));
        assert!(!params.markdown_checkpoint_at(5));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let err = ParameterContext::new(
            0,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::None,
            0.0,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidParameters(_)));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = ParameterContext::new(
            4,
            date("2026-05-24"),
            date("2026-03-01"),
            ReplenishmentStrategy::None,
            0.0,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidParameters(_)));
    }

    #[test]
    fn test_markdown_fields_must_pair() {
        let err = ParameterContext::new(
            12,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::Weekly,
            0.45,
            Some(6),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidParameters(_)));
    }

    #[test]
    fn test_checkpoint_outside_horizon_rejected() {
        let err = ParameterContext::new(
            8,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::Weekly,
            0.45,
            Some(9),
            Some(0.5),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidParameters(_)));
    }

    #[test]
    fn test_replenishment_due() {
        let params = valid().unwrap();
        assert!(params.replenishment_due(1));
        assert!(params.replenishment_due(2));

        let biweekly = ParameterContext::new(
            12,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::Biweekly,
            0.45,
            None,
            None,
        )
        .unwrap();
        assert!(!biweekly.replenishment_due(1));
        assert!(biweekly.replenishment_due(2));

        let none = ParameterContext::new(
            12,
            date("2026-03-01"),
            date("2026-05-24"),
            ReplenishmentStrategy::None,
            0.45,
            None,
            None,
        )
        .unwrap();
        assert!(!none.replenishment_due(1));
        assert!(!none.replenishment_due(2));
    }
}
