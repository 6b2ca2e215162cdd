//! Approval gate: opens and resolves human approval requests.
//!
//! Pending approvals live on the workflow aggregate, so a suspended
//! workflow survives a restart with its gate intact. Resolution is
//! exactly-once: the first decision wins and is recorded in history; the
//! gate reports a repeat resolution distinctly so callers can reject it.

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::approval::{
    ApprovalDecision, ApprovalKind, ApprovalRequest, ApprovalStatus,
};
use crate::domain::models::workflow::{HistoryEntry, Workflow};

/// Outcome of a resolve call.
#[derive(Debug)]
pub enum Resolution {
    /// First resolution of this approval; the decision took effect.
    Resolved(ApprovalRequest),
    /// The approval was already resolved earlier; nothing changed.
    AlreadyResolved,
}

pub struct ApprovalGate;

impl ApprovalGate {
    /// Open a new approval on the workflow. At most one may be pending.
    pub fn open(
        workflow: &mut Workflow,
        kind: ApprovalKind,
        payload: serde_json::Value,
    ) -> DomainResult<ApprovalRequest> {
        if workflow.pending_approval.as_ref().is_some_and(ApprovalRequest::is_pending) {
            return Err(DomainError::ApprovalAlreadyPending(workflow.id));
        }
        let request = ApprovalRequest::new(workflow.id, kind, payload);
        workflow.pending_approval = Some(request.clone());
        Ok(request)
    }

    /// Resolve the approval with the given id.
    ///
    /// Errors with `ApprovalNotFound` when the id matches neither the
    /// pending approval nor any resolved one in history.
    pub fn resolve(
        workflow: &mut Workflow,
        approval_id: Uuid,
        decision: ApprovalDecision,
    ) -> DomainResult<Resolution> {
        if workflow.approval_resolved(approval_id) {
            return Ok(Resolution::AlreadyResolved);
        }

        let Some(pending) = workflow.pending_approval.as_mut() else {
            return Err(DomainError::ApprovalNotFound(approval_id));
        };
        if pending.id != approval_id {
            return Err(DomainError::ApprovalNotFound(approval_id));
        }

        let now = Utc::now();
        pending.status = match decision {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject => ApprovalStatus::Rejected,
        };
        pending.resolved_at = Some(now);
        let resolved = pending.clone();
        let kind = resolved.kind;

        workflow.pending_approval = None;
        workflow.record(HistoryEntry::ApprovalResolved {
            approval_id,
            kind,
            decision,
            at: now,
        });

        Ok(Resolution::Resolved(resolved))
    }
}
