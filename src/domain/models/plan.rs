//! Deterministic execution plan derived from season parameters.
//!
//! Replaces the free-form "planner reasoning" of the source product with an
//! explicit decision table: the same parameters always produce the same
//! plan, and every skipped branch carries a human-readable justification
//! that is recorded into the workflow history at start.

use serde::{Deserialize, Serialize};

use crate::domain::models::parameters::{ParameterContext, ReplenishmentStrategy};

/// A step in the fixed plan skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStep {
    DemandForecast,
    ManufacturingApproval,
    InventoryAllocation,
    WeeklyMonitoring,
    WeeklyReplenishment,
    MarkdownCheckpoint,
    MarkdownApproval,
}

impl std::fmt::Display for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DemandForecast => "demand_forecast",
            Self::ManufacturingApproval => "manufacturing_approval",
            Self::InventoryAllocation => "inventory_allocation",
            Self::WeeklyMonitoring => "weekly_monitoring",
            Self::WeeklyReplenishment => "weekly_replenishment",
            Self::MarkdownCheckpoint => "markdown_checkpoint",
            Self::MarkdownApproval => "markdown_approval",
        };
        write!(f, "{}", s)
    }
}

/// A branch the plan decided not to take, with its rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSkip {
    pub step: PlanStep,
    pub justification: String,
}

/// The conditional plan a workflow will execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
    pub skips: Vec<PlanSkip>,
}

impl ExecutionPlan {
    /// Build the plan for a parameter context.
    ///
    /// Weekly monitoring is always planned; replenishment and the markdown
    /// checkpoint are conditional on the parameters.
    pub fn build(params: &ParameterContext) -> Self {
        let mut steps = vec![
            PlanStep::DemandForecast,
            PlanStep::ManufacturingApproval,
            PlanStep::InventoryAllocation,
            PlanStep::WeeklyMonitoring,
        ];
        let mut skips = Vec::new();

        if params.replenishment_strategy == ReplenishmentStrategy::None {
            skips.push(PlanSkip {
                step: PlanStep::WeeklyReplenishment,
                justification: "replenishment_strategy=none -> holdback phase skipped".to_string(),
            });
        } else {
            steps.push(PlanStep::WeeklyReplenishment);
        }

        if params.markdown_checkpoint_week.is_some() {
            steps.push(PlanStep::MarkdownCheckpoint);
            steps.push(PlanStep::MarkdownApproval);
        } else {
            skips.push(PlanSkip {
                step: PlanStep::MarkdownCheckpoint,
                justification: "markdown_checkpoint_week unset -> pricing phase skipped".to_string(),
            });
        }

        Self { steps, skips }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params(
        strategy: ReplenishmentStrategy,
        checkpoint: Option<u32>,
    ) -> ParameterContext {
        ParameterContext::new(
            12,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 24).unwrap(),
            strategy,
            0.45,
            checkpoint,
            checkpoint.map(|_| 0.6),
        )
        .unwrap()
    }

    #[test]
    fn test_full_plan() {
        let plan = ExecutionPlan::build(&params(ReplenishmentStrategy::Weekly, Some(6)));
        assert!(plan.steps.contains(&PlanStep::WeeklyReplenishment));
        assert!(plan.steps.contains(&PlanStep::MarkdownCheckpoint));
        assert!(plan.skips.is_empty());
    }

    #[test]
    fn test_no_replenishment_is_skipped_with_justification() {
        let plan = ExecutionPlan::build(&params(ReplenishmentStrategy::None, None));
        assert!(!plan.steps.contains(&PlanStep::WeeklyReplenishment));
        assert!(!plan.steps.contains(&PlanStep::MarkdownCheckpoint));
        assert_eq!(plan.skips.len(), 2);
        assert!(plan.skips[0].justification.contains("replenishment_strategy=none"));
        // Monitoring is never skipped.
        assert!(plan.steps.contains(&PlanStep::WeeklyMonitoring));
    }
}
