//! Workflow aggregate and its state machine.
//!
//! The `Workflow` is the single mutable aggregate of the system. Only the
//! orchestrator writes to it, one logical sequence per workflow id, and
//! every mutation is persisted through the `WorkflowStore` before the next
//! step begins. The state enum is a serde-tagged variant so suspension and
//! restart recovery work purely from the persisted record; there is no
//! in-memory continuation to lose.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::approval::{ApprovalDecision, ApprovalKind, ApprovalRequest};
use crate::domain::models::parameters::ParameterContext;
use crate::domain::models::variance::VarianceRecord;

/// State of a workflow's progression through the season plan.
///
/// ```text
/// Created → DemandRunning → AwaitingManufacturingApproval → InventoryRunning
///         → WeeklyMonitoring ⇄ ReforecastTriggered
///         → (PricingRunning → AwaitingMarkdownApproval)? → Completed
/// ```
/// `Failed` is reachable from any non-terminal state; `Cancelled` via the
/// cancel operation. The two `Awaiting*` states are suspend states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Created,
    DemandRunning,
    AwaitingManufacturingApproval {
        approval_id: Uuid,
    },
    InventoryRunning,
    WeeklyMonitoring {
        week: u32,
    },
    /// Variance breached; the demand agent is being re-invoked for this week.
    ReforecastTriggered {
        week: u32,
        attempt: u32,
    },
    PricingRunning {
        week: u32,
        /// Set when the checkpoint week's variance was already evaluated
        /// (re-entry after a reforecast), so it is not recorded twice.
        week_evaluated: bool,
    },
    AwaitingMarkdownApproval {
        approval_id: Uuid,
        week: u32,
    },
    Completed,
    Failed {
        error: String,
    },
    Cancelled,
}

impl WorkflowState {
    /// Short label used in history entries and the store's state column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::DemandRunning => "demand_running",
            Self::AwaitingManufacturingApproval { .. } => "awaiting_manufacturing_approval",
            Self::InventoryRunning => "inventory_running",
            Self::WeeklyMonitoring { .. } => "weekly_monitoring",
            Self::ReforecastTriggered { .. } => "reforecast_triggered",
            Self::PricingRunning { .. } => "pricing_running",
            Self::AwaitingMarkdownApproval { .. } => "awaiting_markdown_approval",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Cancelled)
    }

    /// Whether the workflow is parked at an approval gate.
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            Self::AwaitingManufacturingApproval { .. } | Self::AwaitingMarkdownApproval { .. }
        )
    }

    /// The approval id this state is suspended on, if any.
    pub fn suspended_approval(&self) -> Option<Uuid> {
        match self {
            Self::AwaitingManufacturingApproval { approval_id }
            | Self::AwaitingMarkdownApproval { approval_id, .. } => Some(*approval_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One recorded state change, with an optional audit justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Running,
    Completed,
    Failed,
}

/// Append-only record of one agent call. Never mutated after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInvocation {
    pub agent: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: InvocationStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Entry in the workflow's ordered, append-only history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum HistoryEntry {
    Transition(StateTransition),
    Invocation(AgentInvocation),
    Variance(VarianceRecord),
    Replenishment {
        week: u32,
        units: f64,
        at: DateTime<Utc>,
    },
    ApprovalResolved {
        approval_id: Uuid,
        kind: ApprovalKind,
        decision: ApprovalDecision,
        at: DateTime<Utc>,
    },
}

/// The workflow aggregate: parameters, current state, and full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub parameters: ParameterContext,
    pub state: WorkflowState,
    pub current_week: u32,
    /// Consecutive same-week reforecast count; resets when the week advances.
    pub reforecast_attempts: u32,
    pub pending_approval: Option<ApprovalRequest>,
    /// Latest result per agent, keyed by agent name.
    pub results: BTreeMap<String, serde_json::Value>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(parameters: ParameterContext) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parameters,
            state: WorkflowState::Created,
            current_week: 0,
            reforecast_attempts: 0,
            pending_approval: None,
            results: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new state, recording the transition in history.
    pub fn transition(&mut self, to: WorkflowState, justification: Option<String>) {
        let from = self.state.label().to_string();
        let entry = StateTransition {
            from,
            to: to.label().to_string(),
            at: Utc::now(),
            justification,
        };
        self.history.push(HistoryEntry::Transition(entry));
        self.state = to;
        self.updated_at = Utc::now();
    }

    /// Append a non-transition history entry.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
        self.updated_at = Utc::now();
    }

    pub fn transitions(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter().filter_map(|e| match e {
            HistoryEntry::Transition(t) => Some(t),
            _ => None,
        })
    }

    pub fn variance_records(&self) -> impl Iterator<Item = &VarianceRecord> {
        self.history.iter().filter_map(|e| match e {
            HistoryEntry::Variance(v) => Some(v),
            _ => None,
        })
    }

    pub fn invocations(&self) -> impl Iterator<Item = &AgentInvocation> {
        self.history.iter().filter_map(|e| match e {
            HistoryEntry::Invocation(i) => Some(i),
            _ => None,
        })
    }

    /// Weeks in which a replenishment shipment was dispatched.
    pub fn replenishment_weeks(&self) -> Vec<u32> {
        self.history
            .iter()
            .filter_map(|e| match e {
                HistoryEntry::Replenishment { week, .. } => Some(*week),
                _ => None,
            })
            .collect()
    }

    /// The most recent variance record, if any week has been monitored.
    pub fn latest_variance(&self) -> Option<&VarianceRecord> {
        self.variance_records().last()
    }

    /// Whether the given approval id was already resolved.
    pub fn approval_resolved(&self, approval_id: Uuid) -> bool {
        self.history.iter().any(|e| {
            matches!(e, HistoryEntry::ApprovalResolved { approval_id: id, .. } if *id == approval_id)
        })
    }

    /// Count of state-machine visits to the given state label.
    pub fn visits(&self, label: &str) -> usize {
        self.transitions().filter(|t| t.to == label).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::parameters::ReplenishmentStrategy;
    use chrono::NaiveDate;

    fn workflow() -> Workflow {
        let params = ParameterContext::new(
            8,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 4, 26).unwrap(),
            ReplenishmentStrategy::None,
            0.2,
            None,
            None,
        )
        .unwrap();
        Workflow::new(params)
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let state = WorkflowState::AwaitingMarkdownApproval {
            approval_id: Uuid::new_v4(),
            week: 6,
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
        assert!(state.is_suspended());
        assert!(state.suspended_approval().is_some());
    }

    #[test]
    fn test_terminal_states() {
        assert!(WorkflowState::Completed.is_terminal());
        assert!(WorkflowState::Failed { error: "x".to_string() }.is_terminal());
        assert!(WorkflowState::Cancelled.is_terminal());
        assert!(!WorkflowState::WeeklyMonitoring { week: 3 }.is_terminal());
    }

    #[test]
    fn test_transition_records_history() {
        let mut wf = workflow();
        wf.transition(WorkflowState::DemandRunning, None);
        wf.transition(
            WorkflowState::Failed { error: "boom".to_string() },
            Some("agent failure".to_string()),
        );

        let transitions: Vec<_> = wf.transitions().collect();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].from, "created");
        assert_eq!(transitions[0].to, "demand_running");
        assert_eq!(transitions[1].justification.as_deref(), Some("agent failure"));
        assert_eq!(wf.visits("demand_running"), 1);
    }

    #[test]
    fn test_workflow_serde_roundtrip() {
        let mut wf = workflow();
        wf.transition(WorkflowState::DemandRunning, None);
        wf.record(HistoryEntry::Replenishment { week: 2, units: 50.0, at: Utc::now() });
        let json = serde_json::to_string(&wf).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(wf, back);
        assert_eq!(back.replenishment_weeks(), vec![2]);
    }
}
