//! Orchestrator: owns workflow state and drives every transition.
//!
//! Single-writer per workflow: each running workflow has one driver task,
//! and every mutation happens under that workflow's lock. The lock is not
//! held across agent invocations, so `cancel` and `resume_approval` are
//! never blocked by a slow agent; a late agent result observed after
//! cancellation is discarded. Every mutation is persisted through the
//! store before the next step begins, which is what makes suspend states
//! and crash recovery purely data-driven.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::approval::{ApprovalDecision, ApprovalKind};
use crate::domain::models::artifacts::{DemandForecast, InventoryAllocation};
use crate::domain::models::config::OrchestratorConfig;
use crate::domain::models::parameters::ParameterContext;
use crate::domain::models::plan::ExecutionPlan;
use crate::domain::models::variance::VarianceRecord;
use crate::domain::models::workflow::{
    AgentInvocation, HistoryEntry, InvocationStatus, Workflow, WorkflowState,
};
use crate::domain::ports::actuals::ActualsFeed;
use crate::domain::ports::agent::HandoffContext;
use crate::domain::ports::store::WorkflowStore;
use crate::services::approval_gate::{ApprovalGate, Resolution};
use crate::services::handoff::HandoffAdapter;
use crate::services::status_publisher::{StatusEventKind, StatusPublisher, Subscription};
use crate::services::variance_monitor::VarianceMonitor;

/// What a step tells the driver loop to do next.
enum Flow {
    /// Run the next step immediately.
    Continue,
    /// Stop driving: the workflow is suspended, terminal, or cancelled.
    Park,
}

struct WorkflowHandle {
    id: Uuid,
    workflow: Mutex<Workflow>,
    cancel: CancellationToken,
}

impl WorkflowHandle {
    fn new(workflow: Workflow) -> Arc<Self> {
        Arc::new(Self {
            id: workflow.id,
            workflow: Mutex::new(workflow),
            cancel: CancellationToken::new(),
        })
    }
}

pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn WorkflowStore>,
    handoff: HandoffAdapter,
    monitor: VarianceMonitor,
    actuals: Arc<dyn ActualsFeed>,
    publisher: Arc<StatusPublisher>,
    config: OrchestratorConfig,
    registry: RwLock<HashMap<Uuid, Arc<WorkflowHandle>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        handoff: HandoffAdapter,
        actuals: Arc<dyn ActualsFeed>,
        publisher: Arc<StatusPublisher>,
        config: OrchestratorConfig,
    ) -> Self {
        let monitor = VarianceMonitor::new(config.variance_threshold);
        Self {
            inner: Arc::new(Inner {
                store,
                handoff,
                monitor,
                actuals,
                publisher,
                config,
                registry: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a workflow and begin executing it asynchronously.
    pub async fn start(&self, parameters: ParameterContext) -> DomainResult<Uuid> {
        self.start_workflow(Workflow::new(parameters)).await
    }

    /// Start a pre-built workflow. Rejects an id that was already started.
    pub async fn start_workflow(&self, workflow: Workflow) -> DomainResult<Uuid> {
        let id = workflow.id;
        if self.inner.registry.read().await.contains_key(&id)
            || self.inner.store.get(id).await?.is_some()
        {
            return Err(DomainError::AlreadyStarted(id));
        }

        self.inner.store.save(&workflow).await?;
        let handle = WorkflowHandle::new(workflow);
        self.inner.registry.write().await.insert(id, handle.clone());
        info!(workflow_id = %id, "workflow started");
        Inner::spawn_driver(self.inner.clone(), handle);
        Ok(id)
    }

    /// Resolve the approval a workflow is suspended on and continue it.
    pub async fn resume_approval(
        &self,
        workflow_id: Uuid,
        approval_id: Uuid,
        decision: ApprovalDecision,
    ) -> DomainResult<()> {
        let handle = self.handle_for(workflow_id).await?;
        let respawn = {
            let mut wf = handle.workflow.lock().await;
            if wf.approval_resolved(approval_id) {
                return Err(DomainError::AlreadyResolved(approval_id));
            }
            match wf.state.suspended_approval() {
                Some(id) if id == approval_id => {}
                Some(_) => {
                    return Err(DomainError::ApprovalStateMismatch { workflow_id, approval_id })
                }
                None => return Err(DomainError::ApprovalNotFound(approval_id)),
            }
            let markdown_week = match &wf.state {
                WorkflowState::AwaitingMarkdownApproval { week, .. } => Some(*week),
                _ => None,
            };

            let resolution = ApprovalGate::resolve(&mut wf, approval_id, decision)?;
            let Resolution::Resolved(request) = resolution else {
                return Err(DomainError::AlreadyResolved(approval_id));
            };
            info!(workflow_id = %workflow_id, approval_id = %approval_id,
                  kind = %request.kind, decision = %decision, "approval resolved");

            match (request.kind, decision, markdown_week) {
                (ApprovalKind::Manufacturing, ApprovalDecision::Approve, _) => {
                    wf.transition(
                        WorkflowState::InventoryRunning,
                        Some("manufacturing plan approved".to_string()),
                    );
                    self.inner.store.update(&wf).await?;
                    true
                }
                (ApprovalKind::Manufacturing, ApprovalDecision::Reject, _) => {
                    wf.transition(
                        WorkflowState::Cancelled,
                        Some("manufacturing plan rejected".to_string()),
                    );
                    self.inner.store.update(&wf).await?;
                    self.inner.publisher.publish(
                        workflow_id,
                        StatusEventKind::Error {
                            agent: None,
                            message: "manufacturing plan rejected; workflow cancelled".to_string(),
                        },
                    );
                    self.inner.publisher.close(workflow_id);
                    false
                }
                (ApprovalKind::Markdown, decision, Some(week)) => {
                    let justification = match decision {
                        ApprovalDecision::Approve => "markdown approved".to_string(),
                        ApprovalDecision::Reject => {
                            "markdown declined; monitoring continues at full price".to_string()
                        }
                    };
                    matches!(
                        self.inner
                            .advance_past_week_with(&mut wf, week, Some(justification))
                            .await?,
                        Flow::Continue
                    )
                }
                (ApprovalKind::Markdown, _, None) => {
                    return Err(DomainError::ApprovalStateMismatch { workflow_id, approval_id })
                }
            }
        };

        if respawn {
            Inner::spawn_driver(self.inner.clone(), handle);
        }
        Ok(())
    }

    /// Cancel a workflow. Terminal workflows are left untouched.
    pub async fn cancel(&self, workflow_id: Uuid) -> DomainResult<()> {
        let handle = self.handle_for(workflow_id).await?;
        {
            let mut wf = handle.workflow.lock().await;
            if wf.state.is_terminal() {
                return Ok(());
            }
            wf.transition(
                WorkflowState::Cancelled,
                Some("cancelled by operator".to_string()),
            );
            self.inner.store.update(&wf).await?;
        }
        // Signal after the state is durably Cancelled so any in-flight agent
        // result is discarded rather than applied.
        handle.cancel.cancel();
        self.inner.publisher.publish(
            workflow_id,
            StatusEventKind::Error {
                agent: None,
                message: "workflow cancelled".to_string(),
            },
        );
        self.inner.publisher.close(workflow_id);
        info!(workflow_id = %workflow_id, "workflow cancelled");
        Ok(())
    }

    /// Current snapshot of a workflow, live when running, from the store
    /// otherwise.
    pub async fn get(&self, workflow_id: Uuid) -> DomainResult<Workflow> {
        if let Some(handle) = self.inner.registry.read().await.get(&workflow_id).cloned() {
            return Ok(handle.workflow.lock().await.clone());
        }
        self.inner
            .store
            .get(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))
    }

    /// Subscribe to a workflow's status stream: replay, then live.
    pub fn subscribe(&self, workflow_id: Uuid) -> Subscription {
        self.inner.publisher.subscribe(workflow_id)
    }

    /// Reload all non-terminal workflows from the store after a restart.
    ///
    /// Suspended workflows are registered but not driven; they wait for
    /// their approval. Everything else resumes from its persisted state.
    pub async fn recover(&self) -> DomainResult<Vec<Uuid>> {
        let active = self.inner.store.list_active().await?;
        let mut recovered = Vec::new();
        for workflow in active {
            let id = workflow.id;
            if self.inner.registry.read().await.contains_key(&id) {
                continue;
            }
            let suspended = workflow.state.is_suspended();
            let handle = WorkflowHandle::new(workflow);
            self.inner.registry.write().await.insert(id, handle.clone());
            info!(workflow_id = %id, suspended, "workflow recovered");
            if !suspended {
                Inner::spawn_driver(self.inner.clone(), handle);
            }
            recovered.push(id);
        }
        Ok(recovered)
    }

    async fn handle_for(&self, workflow_id: Uuid) -> DomainResult<Arc<WorkflowHandle>> {
        if let Some(handle) = self.inner.registry.read().await.get(&workflow_id).cloned() {
            return Ok(handle);
        }
        let workflow = self
            .inner
            .store
            .get(workflow_id)
            .await?
            .ok_or(DomainError::WorkflowNotFound(workflow_id))?;
        let handle = WorkflowHandle::new(workflow);
        let mut registry = self.inner.registry.write().await;
        Ok(registry.entry(workflow_id).or_insert(handle).clone())
    }
}

impl Inner {
    fn spawn_driver(inner: Arc<Inner>, handle: Arc<WorkflowHandle>) {
        tokio::spawn(async move {
            inner.drive(handle).await;
        });
    }

    async fn drive(&self, handle: Arc<WorkflowHandle>) {
        loop {
            let state = handle.workflow.lock().await.state.clone();
            if handle.cancel.is_cancelled() {
                break;
            }
            let step = match state {
                WorkflowState::Created => self.step_created(&handle).await,
                WorkflowState::DemandRunning => self.step_demand(&handle).await,
                WorkflowState::InventoryRunning => self.step_inventory(&handle).await,
                WorkflowState::WeeklyMonitoring { week } => self.step_weekly(&handle, week).await,
                WorkflowState::ReforecastTriggered { week, .. } => {
                    self.step_reforecast(&handle, week).await
                }
                WorkflowState::PricingRunning { week, week_evaluated } => {
                    self.step_pricing(&handle, week, week_evaluated).await
                }
                WorkflowState::AwaitingManufacturingApproval { .. }
                | WorkflowState::AwaitingMarkdownApproval { .. }
                | WorkflowState::Completed
                | WorkflowState::Failed { .. }
                | WorkflowState::Cancelled => break,
            };
            match step {
                Ok(Flow::Continue) => {}
                Ok(Flow::Park) => break,
                Err(err) => {
                    self.fail_workflow(&handle, err).await;
                    break;
                }
            }
        }
    }

    async fn step_created(&self, handle: &Arc<WorkflowHandle>) -> DomainResult<Flow> {
        let mut wf = handle.workflow.lock().await;
        let plan = ExecutionPlan::build(&wf.parameters);
        // Skipped plan branches are recorded up front so the audit trail
        // explains them without re-deriving the parameters.
        let justification = (!plan.skips.is_empty()).then(|| {
            plan.skips
                .iter()
                .map(|s| s.justification.clone())
                .collect::<Vec<_>>()
                .join("; ")
        });
        wf.transition(WorkflowState::DemandRunning, justification);
        self.store.update(&wf).await?;
        Ok(Flow::Continue)
    }

    async fn step_demand(&self, handle: &Arc<WorkflowHandle>) -> DomainResult<Flow> {
        let Some(forecast) = self.run_agent(handle, "demand", None).await? else {
            return Ok(Flow::Park);
        };

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(Flow::Park);
        }
        let request = ApprovalGate::open(&mut wf, ApprovalKind::Manufacturing, forecast.clone())?;
        wf.transition(
            WorkflowState::AwaitingManufacturingApproval { approval_id: request.id },
            None,
        );
        self.store.update(&wf).await?;
        drop(wf);

        self.publisher.publish(
            handle.id,
            StatusEventKind::HumanInputRequired {
                approval_kind: ApprovalKind::Manufacturing,
                payload: forecast,
            },
        );
        Ok(Flow::Park)
    }

    async fn step_inventory(&self, handle: &Arc<WorkflowHandle>) -> DomainResult<Flow> {
        let Some(_) = self.run_agent(handle, "inventory", None).await? else {
            return Ok(Flow::Park);
        };

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(Flow::Park);
        }
        Self::enter_week(&mut wf, 1, None);
        self.store.update(&wf).await?;
        Ok(Flow::Continue)
    }

    async fn step_weekly(&self, handle: &Arc<WorkflowHandle>, week: u32) -> DomainResult<Flow> {
        let Some(record) = self.evaluate_week(handle, week).await? else {
            return Ok(Flow::Park);
        };

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(Flow::Park);
        }
        if record.threshold_exceeded {
            return self.trigger_reforecast(&mut wf, week, &record).await;
        }
        if wf.parameters.markdown_checkpoint_at(week) {
            // Re-entry after a reforecast at the checkpoint week; the
            // variance for this week is already recorded.
            wf.transition(
                WorkflowState::PricingRunning { week, week_evaluated: true },
                None,
            );
            self.store.update(&wf).await?;
            return Ok(Flow::Continue);
        }
        self.advance_past_week(&mut wf, week).await
    }

    async fn step_reforecast(&self, handle: &Arc<WorkflowHandle>, week: u32) -> DomainResult<Flow> {
        let actuals = handle
            .workflow
            .lock()
            .await
            .latest_variance()
            .map(|v| v.actual_cumulative);
        let Some(_) = self.run_agent(handle, "demand", actuals).await? else {
            return Ok(Flow::Park);
        };

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(Flow::Park);
        }
        // The week counter does not advance; the same week is re-evaluated
        // against the fresh forecast.
        wf.transition(
            WorkflowState::WeeklyMonitoring { week },
            Some(format!("reforecast complete; week {week} re-evaluated")),
        );
        self.store.update(&wf).await?;
        Ok(Flow::Continue)
    }

    async fn step_pricing(
        &self,
        handle: &Arc<WorkflowHandle>,
        week: u32,
        week_evaluated: bool,
    ) -> DomainResult<Flow> {
        if !week_evaluated {
            let Some(record) = self.evaluate_week(handle, week).await? else {
                return Ok(Flow::Park);
            };
            let mut wf = handle.workflow.lock().await;
            if wf.state.is_terminal() {
                return Ok(Flow::Park);
            }
            if record.threshold_exceeded {
                return self.trigger_reforecast(&mut wf, week, &record).await;
            }
            // Not a state-machine transition, just a resume marker: a crash
            // between here and the pricing result must not re-record the
            // week's variance.
            wf.state = WorkflowState::PricingRunning { week, week_evaluated: true };
            wf.updated_at = Utc::now();
            self.store.update(&wf).await?;
        }

        let actuals = handle
            .workflow
            .lock()
            .await
            .latest_variance()
            .map(|v| v.actual_cumulative);
        let Some(recommendation) = self.run_agent(handle, "pricing", actuals).await? else {
            return Ok(Flow::Park);
        };

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(Flow::Park);
        }
        let request = ApprovalGate::open(&mut wf, ApprovalKind::Markdown, recommendation.clone())?;
        wf.transition(
            WorkflowState::AwaitingMarkdownApproval { approval_id: request.id, week },
            None,
        );
        self.store.update(&wf).await?;
        drop(wf);

        self.publisher.publish(
            handle.id,
            StatusEventKind::HumanInputRequired {
                approval_kind: ApprovalKind::Markdown,
                payload: recommendation,
            },
        );
        Ok(Flow::Park)
    }

    /// Evaluate one week's variance, record it with any due replenishment,
    /// and publish monitor progress. `None` means the workflow went
    /// terminal while the actuals were being fetched.
    async fn evaluate_week(
        &self,
        handle: &Arc<WorkflowHandle>,
        week: u32,
    ) -> DomainResult<Option<VarianceRecord>> {
        let forecast = {
            let wf = handle.workflow.lock().await;
            let value = wf
                .results
                .get("demand")
                .ok_or_else(|| DomainError::ResultMissing("demand".to_string()))?;
            DemandForecast::from_value(value)?
        };
        let forecasted = forecast.cumulative_through(week);
        let actual = self
            .actuals
            .cumulative_actuals(handle.id, week, forecasted)
            .await?;
        let record = self.monitor.evaluate(week, forecasted, actual);

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(None);
        }
        wf.record(HistoryEntry::Variance(record.clone()));

        // One shipment per due week, even when the week is re-evaluated
        // after a reforecast.
        if wf.parameters.replenishment_due(week) && !wf.replenishment_weeks().contains(&week) {
            if let Some(value) = wf.results.get("inventory") {
                let allocation = InventoryAllocation::from_value(value)?;
                let units = allocation.units_per_shipment();
                if units > 0.0 {
                    wf.record(HistoryEntry::Replenishment { week, units, at: Utc::now() });
                }
            }
        }
        let horizon = wf.parameters.horizon_weeks;
        self.store.update(&wf).await?;
        drop(wf);

        self.publisher.publish(
            handle.id,
            StatusEventKind::AgentProgress {
                agent: "variance_monitor".to_string(),
                message: format!(
                    "week {} of {}: variance {:+.1}%",
                    week,
                    horizon,
                    record.variance_pct * 100.0
                ),
                progress_pct: Some(f64::from(week) / f64::from(horizon) * 100.0),
            },
        );
        Ok(Some(record))
    }

    /// Enter the reforecast loop for a breached week, bounded by the
    /// configured attempt limit.
    async fn trigger_reforecast(
        &self,
        wf: &mut Workflow,
        week: u32,
        record: &VarianceRecord,
    ) -> DomainResult<Flow> {
        let attempt = wf.reforecast_attempts + 1;
        if attempt > self.config.max_reforecasts {
            return Err(DomainError::ReforecastLoopExceeded {
                week,
                attempts: wf.reforecast_attempts,
            });
        }
        wf.reforecast_attempts = attempt;
        warn!(workflow_id = %wf.id, week, attempt,
              variance_pct = record.variance_pct, "variance breach; reforecasting");
        wf.transition(
            WorkflowState::ReforecastTriggered { week, attempt },
            Some(format!(
                "variance {:+.1}% breached the {:.0}% threshold",
                record.variance_pct * 100.0,
                self.config.variance_threshold * 100.0
            )),
        );
        self.store.update(wf).await?;
        Ok(Flow::Continue)
    }

    /// Advance the week counter past a fully-evaluated week, completing the
    /// workflow when the horizon is exhausted.
    async fn advance_past_week(&self, wf: &mut Workflow, week: u32) -> DomainResult<Flow> {
        self.advance_past_week_with(wf, week, None).await
    }

    async fn advance_past_week_with(
        &self,
        wf: &mut Workflow,
        week: u32,
        justification: Option<String>,
    ) -> DomainResult<Flow> {
        wf.reforecast_attempts = 0;
        let next = week + 1;
        if next > wf.parameters.horizon_weeks {
            wf.transition(WorkflowState::Completed, justification);
            self.store.update(wf).await?;
            let result = serde_json::json!({
                "weeks_monitored": wf.parameters.horizon_weeks,
                "results": wf.results,
            });
            info!(workflow_id = %wf.id, "workflow completed");
            self.publisher
                .publish(wf.id, StatusEventKind::WorkflowComplete { result });
            self.publisher.close(wf.id);
            return Ok(Flow::Park);
        }
        Self::enter_week(wf, next, justification);
        self.store.update(wf).await?;
        Ok(Flow::Continue)
    }

    fn enter_week(wf: &mut Workflow, week: u32, justification: Option<String>) {
        wf.current_week = week;
        if wf.parameters.markdown_checkpoint_at(week) {
            wf.transition(
                WorkflowState::PricingRunning { week, week_evaluated: false },
                justification,
            );
        } else {
            wf.transition(WorkflowState::WeeklyMonitoring { week }, justification);
        }
    }

    /// Invoke an agent without holding the workflow lock.
    ///
    /// `Ok(None)` means the invocation was cancelled or the workflow went
    /// terminal while it ran; the result, if any, is discarded.
    async fn run_agent(
        &self,
        handle: &Arc<WorkflowHandle>,
        agent: &str,
        actuals: Option<f64>,
    ) -> DomainResult<Option<serde_json::Value>> {
        let (params, context) = {
            let wf = handle.workflow.lock().await;
            let context = HandoffContext {
                prior_results: wf.results.clone(),
                actuals_cumulative: actuals,
                current_week: wf.current_week,
            };
            (wf.parameters.clone(), context)
        };

        self.publisher.publish(
            handle.id,
            StatusEventKind::AgentStarted { agent: agent.to_string() },
        );
        let started_at = Utc::now();
        let clock = Instant::now();

        let outcome = self
            .handoff
            .invoke(agent, &params, &context, handle.cancel.child_token())
            .await;

        let mut wf = handle.workflow.lock().await;
        if wf.state.is_terminal() {
            return Ok(None);
        }
        match outcome {
            Ok(value) => {
                wf.record(HistoryEntry::Invocation(AgentInvocation {
                    agent: agent.to_string(),
                    started_at,
                    completed_at: Some(Utc::now()),
                    status: InvocationStatus::Completed,
                    result: Some(value.clone()),
                    error: None,
                }));
                wf.results.insert(agent.to_string(), value.clone());
                self.store.update(&wf).await?;
                drop(wf);
                self.publisher.publish(
                    handle.id,
                    StatusEventKind::AgentCompleted {
                        agent: agent.to_string(),
                        duration_seconds: clock.elapsed().as_secs_f64(),
                        result: value.clone(),
                    },
                );
                Ok(Some(value))
            }
            Err(DomainError::InvocationCancelled(_)) => Ok(None),
            Err(err) => {
                wf.record(HistoryEntry::Invocation(AgentInvocation {
                    agent: agent.to_string(),
                    started_at,
                    completed_at: Some(Utc::now()),
                    status: InvocationStatus::Failed,
                    result: None,
                    error: Some(err.to_string()),
                }));
                self.store.update(&wf).await?;
                Err(err)
            }
        }
    }

    /// Terminal failure path: preserve the cause, notify, close the stream.
    async fn fail_workflow(&self, handle: &Arc<WorkflowHandle>, err: DomainError) {
        let agent = match &err {
            DomainError::AgentFailure { agent, .. } | DomainError::AgentTimeout { agent, .. } => {
                Some(agent.clone())
            }
            _ => None,
        };
        let message = err.to_string();

        {
            let mut wf = handle.workflow.lock().await;
            if wf.state.is_terminal() {
                return;
            }
            error!(workflow_id = %handle.id, %message, "workflow failed");
            wf.transition(WorkflowState::Failed { error: message.clone() }, None);
            if let Err(store_err) = self.store.update(&wf).await {
                error!(workflow_id = %handle.id, error = %store_err,
                       "failed to persist terminal failure");
            }
        }

        self.publisher
            .publish(handle.id, StatusEventKind::Error { agent, message });
        self.publisher.close(handle.id);
    }
}
