//! End-to-end orchestrator tests over the real SQLite store and the
//! built-in agents, with scripted actuals steering the variance monitor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use merchflow::adapters::actuals::ScriptedActualsFeed;
use merchflow::adapters::agents::{MockAgent, MockBehavior};
use merchflow::domain::errors::DomainError;
use merchflow::services::StatusEventKind;
use merchflow::{
    ApprovalDecision, HistoryEntry, ReplenishmentStrategy, Workflow, WorkflowState,
};
use uuid::Uuid;

use common::*;

fn variance_weeks(workflow: &Workflow) -> Vec<u32> {
    workflow.variance_records().map(|v| v.week_number).collect()
}

fn demand_invocations(workflow: &Workflow) -> usize {
    workflow.invocations().filter(|i| i.agent == "demand").count()
}

#[tokio::test]
async fn test_full_season_with_markdown_checkpoint() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(12, ReplenishmentStrategy::Weekly, 0.45, Some((6, 0.60)));
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let markdown = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, markdown, ApprovalDecision::Approve)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Completed);

    // Weeks 1-5 and 7-12 are monitored in WeeklyMonitoring; week 6 is
    // evaluated inside the pricing visit.
    assert_eq!(done.visits("weekly_monitoring"), 11);
    assert_eq!(done.visits("pricing_running"), 1);
    assert_eq!(done.visits("awaiting_manufacturing_approval"), 1);
    assert_eq!(done.visits("awaiting_markdown_approval"), 1);
    assert_eq!(done.visits("reforecast_triggered"), 0);

    assert_eq!(variance_weeks(&done), (1..=12).collect::<Vec<u32>>());
    // Weekly replenishment dispatches every week of the season.
    assert_eq!(done.replenishment_weeks(), (1..=12).collect::<Vec<u32>>());

    assert_eq!(demand_invocations(&done), 1);
    assert!(done.results.contains_key("demand"));
    assert!(done.results.contains_key("inventory"));
    assert!(done.results.contains_key("pricing"));
}

#[tokio::test]
async fn test_no_replenishment_no_markdown() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(8, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Completed);

    // Monitoring is never skipped, replenishment and pricing are.
    assert_eq!(variance_weeks(&done), (1..=8).collect::<Vec<u32>>());
    assert!(done.replenishment_weeks().is_empty());
    assert_eq!(done.visits("pricing_running"), 0);
    assert_eq!(done.visits("awaiting_markdown_approval"), 0);

    // The plan's skip decisions are recorded up front as audit text.
    let first = done.transitions().next().unwrap();
    let justification = first.justification.as_deref().unwrap_or_default();
    assert!(justification.contains("replenishment_strategy=none"));
    assert!(justification.contains("markdown_checkpoint_week unset"));
}

#[tokio::test]
async fn test_variance_breach_triggers_single_reforecast() {
    // On track for weeks 1-4, 31% over forecast at week 5.
    let feed = Arc::new(ScriptedActualsFeed::new([1.0, 1.0, 1.0, 1.0, 1.31]));
    let orchestrator = build_orchestrator(feed).await;
    let params = season_params(8, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Completed);

    assert_eq!(done.visits("reforecast_triggered"), 1);
    assert_eq!(demand_invocations(&done), 2);

    // Week 5 is evaluated twice: the breach and the post-reforecast pass.
    let week5: Vec<bool> = done
        .variance_records()
        .filter(|v| v.week_number == 5)
        .map(|v| v.threshold_exceeded)
        .collect();
    assert_eq!(week5, [true, false]);

    // The rescaled forecast carries the week counter forward normally.
    assert_eq!(done.current_week, 8);
}

#[tokio::test]
async fn test_reforecast_loop_exceeded_fails_workflow() {
    // Actuals run 50% hot every week, so every rescale immediately
    // breaches again.
    let feed = Arc::new(ScriptedActualsFeed::constant(1.5));
    let orchestrator = build_orchestrator(feed).await;
    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    match &done.state {
        WorkflowState::Failed { error } => {
            assert!(error.contains("Re-forecast loop exceeded"), "got: {error}");
        }
        other => panic!("expected Failed, got {other}"),
    }
    assert_eq!(done.visits("reforecast_triggered"), 3);
    assert_eq!(done.current_week, 1);
}

#[tokio::test]
async fn test_manufacturing_rejection_cancels_workflow() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();
    let mut subscription = orchestrator.subscribe(id);

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Reject)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Cancelled);
    assert!(done.variance_records().next().is_none());

    // The rejection surfaces on the event stream, which then closes.
    let mut saw_rejection = false;
    while let Some(event) = subscription.next().await {
        if let StatusEventKind::Error { agent: None, message } = &event.kind {
            saw_rejection = message.contains("rejected");
        }
    }
    assert!(saw_rejection);
}

#[tokio::test]
async fn test_markdown_rejection_continues_monitoring() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(6, ReplenishmentStrategy::None, 0.0, Some((3, 0.60)));
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let markdown = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, markdown, ApprovalDecision::Reject)
        .await
        .unwrap();

    // Declining the markdown does not end the season.
    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Completed);
    assert_eq!(variance_weeks(&done), (1..=6).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_resume_approval_is_single_use() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let err = orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyResolved(_)));

    // The duplicate call left the workflow unaffected.
    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Completed);
}

#[tokio::test]
async fn test_at_most_one_pending_approval() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    wait_for_pending_approval(&orchestrator, id).await;
    let suspended = orchestrator.get(id).await.unwrap();
    assert!(suspended.pending_approval.is_some());
    assert!(suspended.state.is_suspended());

    let err = orchestrator
        .resume_approval(id, Uuid::new_v4(), ApprovalDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ApprovalNotFound(_)));
}

#[tokio::test]
async fn test_agent_failure_is_terminal_with_detail() {
    let pool = merchflow::adapters::sqlite::create_migrated_test_pool()
        .await
        .unwrap();
    let mut handoff = builtin_handoff();
    handoff.register(MockAgent::with_default("demand", MockBehavior::failure("model exploded")));
    let orchestrator = build_orchestrator_on(pool, on_track_feed(), handoff);

    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    match &done.state {
        WorkflowState::Failed { error } => assert!(error.contains("model exploded")),
        other => panic!("expected Failed, got {other}"),
    }
    // The failed invocation is preserved in history for postmortem.
    let failed = done
        .invocations()
        .find(|i| i.agent == "demand")
        .expect("demand invocation recorded");
    assert!(failed.error.as_deref().unwrap_or_default().contains("model exploded"));
}

#[tokio::test]
async fn test_agent_timeout_is_distinct_from_failure() {
    let pool = merchflow::adapters::sqlite::create_migrated_test_pool()
        .await
        .unwrap();
    let mut handoff = merchflow::HandoffAdapter::new(
        merchflow::domain::models::config::AgentsConfig {
            demand_timeout_secs: 1,
            inventory_timeout_secs: 1,
            pricing_timeout_secs: 1,
        },
        merchflow::domain::models::config::RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 10,
        },
    );
    handoff.register(MockAgent::with_default(
        "demand",
        MockBehavior::delayed(serde_json::json!({}), Duration::from_secs(30)),
    ));
    let orchestrator = build_orchestrator_on(pool, on_track_feed(), handoff);

    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    match &done.state {
        WorkflowState::Failed { error } => {
            assert!(error.contains("invocation bound"), "got: {error}");
            assert!(!error.contains("failed:"));
        }
        other => panic!("expected Failed, got {other}"),
    }
}

#[tokio::test]
async fn test_cancel_discards_in_flight_agent_result() {
    let pool = merchflow::adapters::sqlite::create_migrated_test_pool()
        .await
        .unwrap();
    let mut handoff = builtin_handoff();
    handoff.register(MockAgent::with_default(
        "demand",
        MockBehavior::delayed(serde_json::json!({"late": true}), Duration::from_millis(500)),
    ));
    let orchestrator = build_orchestrator_on(pool, on_track_feed(), handoff);

    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();

    // Give the driver a moment to reach the demand invocation, then cancel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.cancel(id).await.unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.state, WorkflowState::Cancelled);

    // The late result never lands.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let after = orchestrator.get(id).await.unwrap();
    assert!(after.results.is_empty());
    assert_eq!(after.state, WorkflowState::Cancelled);
}

#[tokio::test]
async fn test_cancel_unknown_workflow() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let err = orchestrator.cancel(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DomainError::WorkflowNotFound(_)));
}

#[tokio::test]
async fn test_start_same_id_twice_rejected() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(4, ReplenishmentStrategy::None, 0.0, None);

    let workflow = Workflow::new(params.clone());
    let duplicate = workflow.clone();
    orchestrator.start_workflow(workflow).await.unwrap();

    let err = orchestrator.start_workflow(duplicate).await.unwrap_err();
    assert!(matches!(err, DomainError::AlreadyStarted(_)));
}

#[tokio::test]
async fn test_event_stream_replay_matches_live() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(3, ReplenishmentStrategy::None, 0.0, None);
    let id = orchestrator.start(params).await.unwrap();
    let mut live = orchestrator.subscribe(id);

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();
    wait_for_terminal(&orchestrator, id).await;

    let mut live_events = Vec::new();
    while let Some(event) = live.next().await {
        live_events.push(event);
    }
    assert!(!live.lagged());

    // A late subscriber replays the identical sequence.
    let mut late = orchestrator.subscribe(id);
    let mut replayed = Vec::new();
    while let Some(event) = late.next().await {
        replayed.push(event);
    }
    assert_eq!(live_events, replayed);

    // Stream shape: demand starts first, completion ends it.
    assert!(matches!(
        live_events.first().map(|e| &e.kind),
        Some(StatusEventKind::AgentStarted { agent }) if agent == "demand"
    ));
    assert!(matches!(
        live_events.last().map(|e| &e.kind),
        Some(StatusEventKind::WorkflowComplete { .. })
    ));

    // Timestamps are monotonically non-decreasing per workflow.
    for pair in live_events.windows(2) {
        assert!(pair[0].at <= pair[1].at);
    }
}

#[tokio::test]
async fn test_replenishment_history_carries_shipment_units() {
    let orchestrator = build_orchestrator(on_track_feed()).await;
    let params = season_params(4, ReplenishmentStrategy::Biweekly, 0.30, None);
    let id = orchestrator.start(params).await.unwrap();

    let manufacturing = wait_for_pending_approval(&orchestrator, id).await;
    orchestrator
        .resume_approval(id, manufacturing, ApprovalDecision::Approve)
        .await
        .unwrap();

    let done = wait_for_terminal(&orchestrator, id).await;
    assert_eq!(done.replenishment_weeks(), vec![2, 4]);

    let units: Vec<f64> = done
        .history
        .iter()
        .filter_map(|e| match e {
            HistoryEntry::Replenishment { units, .. } => Some(*units),
            _ => None,
        })
        .collect();
    // 30% of ~4000 forecast units over two biweekly shipments.
    for u in units {
        assert!((u - 600.0).abs() < 50.0, "unexpected shipment size {u}");
    }
}
