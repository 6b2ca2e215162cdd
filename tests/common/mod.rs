//! Shared setup helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tokio::time::Instant;
use uuid::Uuid;

use merchflow::adapters::actuals::ScriptedActualsFeed;
use merchflow::adapters::agents::{DemandAgent, InventoryAgent, PricingAgent};
use merchflow::adapters::sqlite::{create_migrated_test_pool, SqliteWorkflowStore};
use merchflow::domain::models::config::{AgentsConfig, OrchestratorConfig, RetryConfig};
use merchflow::domain::ports::actuals::ActualsFeed;
use merchflow::{
    HandoffAdapter, Orchestrator, ParameterContext, ReplenishmentStrategy, StatusPublisher,
    Workflow,
};

/// Season parameters with sensible test dates.
pub fn season_params(
    horizon_weeks: u32,
    strategy: ReplenishmentStrategy,
    dc_holdback_pct: f64,
    markdown: Option<(u32, f64)>,
) -> ParameterContext {
    ParameterContext::new(
        horizon_weeks,
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
        strategy,
        dc_holdback_pct,
        markdown.map(|(week, _)| week),
        markdown.map(|(_, threshold)| threshold),
    )
    .unwrap()
}

/// Handoff adapter with the three built-in agents and short timeouts.
pub fn builtin_handoff() -> HandoffAdapter {
    let timeouts = AgentsConfig {
        demand_timeout_secs: 5,
        inventory_timeout_secs: 5,
        pricing_timeout_secs: 5,
    };
    let retry = RetryConfig {
        max_retries: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 10,
    };
    let mut handoff = HandoffAdapter::new(timeouts, retry);
    handoff.register(Arc::new(DemandAgent));
    handoff.register(Arc::new(InventoryAgent));
    handoff.register(Arc::new(PricingAgent));
    handoff
}

pub fn default_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        variance_threshold: 0.20,
        max_reforecasts: 3,
        event_buffer: 256,
    }
}

/// Orchestrator over a fresh in-memory store with the built-in agents.
pub async fn build_orchestrator(feed: Arc<dyn ActualsFeed>) -> Orchestrator {
    let pool = create_migrated_test_pool().await.unwrap();
    build_orchestrator_on(pool, feed, builtin_handoff())
}

/// Orchestrator over a given pool, for restart-recovery tests.
pub fn build_orchestrator_on(
    pool: SqlitePool,
    feed: Arc<dyn ActualsFeed>,
    handoff: HandoffAdapter,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(SqliteWorkflowStore::new(pool)),
        handoff,
        feed,
        Arc::new(StatusPublisher::new(256)),
        default_orchestrator_config(),
    )
}

/// Feed that tracks the forecast exactly every week.
pub fn on_track_feed() -> Arc<dyn ActualsFeed> {
    Arc::new(ScriptedActualsFeed::on_track())
}

/// Poll a workflow until the predicate holds or the timeout expires.
pub async fn wait_until(
    orchestrator: &Orchestrator,
    workflow_id: Uuid,
    timeout: Duration,
    pred: impl Fn(&Workflow) -> bool,
) -> Workflow {
    let deadline = Instant::now() + timeout;
    loop {
        let workflow = orchestrator.get(workflow_id).await.unwrap();
        if pred(&workflow) {
            return workflow;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for workflow condition; state is {}",
            workflow.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait for the next suspension and return the pending approval id.
pub async fn wait_for_pending_approval(orchestrator: &Orchestrator, workflow_id: Uuid) -> Uuid {
    let workflow = wait_until(orchestrator, workflow_id, Duration::from_secs(5), |w| {
        w.state.is_suspended()
    })
    .await;
    workflow
        .pending_approval
        .expect("suspended workflow must carry a pending approval")
        .id
}

/// Wait until the workflow reaches a terminal state.
pub async fn wait_for_terminal(orchestrator: &Orchestrator, workflow_id: Uuid) -> Workflow {
    wait_until(orchestrator, workflow_id, Duration::from_secs(10), |w| {
        w.state.is_terminal()
    })
    .await
}
