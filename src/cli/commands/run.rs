//! `merchflow run`: start one workflow and stream it to the terminal.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use crate::adapters::actuals::SimulatedActualsFeed;
use crate::adapters::agents::{DemandAgent, InventoryAgent, PricingAgent};
use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteWorkflowStore};
use crate::domain::models::approval::{ApprovalDecision, ApprovalKind};
use crate::domain::models::parameters::{ParameterContext, ReplenishmentStrategy};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{HandoffAdapter, Orchestrator, StatusEventKind, StatusPublisher};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Season length in weeks
    #[arg(long, default_value_t = 12)]
    pub horizon_weeks: u32,

    /// Season start date (YYYY-MM-DD)
    #[arg(long, default_value = "2026-03-01")]
    pub start_date: String,

    /// Season end date (YYYY-MM-DD)
    #[arg(long, default_value = "2026-05-24")]
    pub end_date: String,

    /// Replenishment strategy: none, weekly, or biweekly
    #[arg(long, default_value = "weekly")]
    pub strategy: String,

    /// Fraction of units held back at the distribution center, in [0, 1]
    #[arg(long, default_value_t = 0.45)]
    pub holdback: f64,

    /// Week of the markdown checkpoint (omit to skip pricing entirely)
    #[arg(long)]
    pub markdown_week: Option<u32>,

    /// Sell-through threshold below which a markdown is considered
    #[arg(long)]
    pub markdown_threshold: Option<f64>,

    /// Reject the manufacturing approval instead of approving it
    #[arg(long)]
    pub reject_manufacturing: bool,

    /// Reject the markdown approval instead of approving it
    #[arg(long)]
    pub reject_markdown: bool,
}

pub async fn execute(args: RunArgs, json: bool) -> Result<()> {
    let strategy = parse_strategy(&args.strategy)?;
    let parameters = ParameterContext::new(
        args.horizon_weeks,
        parse_date(&args.start_date)?,
        parse_date(&args.end_date)?,
        strategy,
        args.holdback,
        args.markdown_week,
        args.markdown_threshold,
    )
    .context("invalid season parameters")?;

    let config = ConfigLoader::load()?;
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = initialize_database(&config.database.path, Some(pool_config))
        .await
        .context("failed to open database")?;

    let mut handoff = HandoffAdapter::new(config.agents.clone(), config.retry.clone());
    handoff.register(Arc::new(DemandAgent));
    handoff.register(Arc::new(InventoryAgent));
    handoff.register(Arc::new(PricingAgent));

    let publisher = Arc::new(StatusPublisher::new(config.orchestrator.event_buffer));
    let orchestrator = Orchestrator::new(
        Arc::new(SqliteWorkflowStore::new(pool)),
        handoff,
        Arc::new(SimulatedActualsFeed),
        publisher,
        config.orchestrator.clone(),
    );

    let workflow_id = orchestrator.start(parameters).await?;
    if !json {
        println!("workflow {workflow_id} started");
    }

    let mut subscription = orchestrator.subscribe(workflow_id);
    while let Some(event) = subscription.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            print_event(&event.kind);
        }

        if let StatusEventKind::HumanInputRequired { approval_kind, .. } = &event.kind {
            let decision = decision_for(*approval_kind, &args);
            let snapshot = orchestrator.get(workflow_id).await?;
            if let Some(approval) = snapshot.pending_approval {
                if !json {
                    println!("  -> {decision} {approval_kind} request {}", approval.id);
                }
                orchestrator
                    .resume_approval(workflow_id, approval.id, decision)
                    .await?;
            }
        }
    }

    let final_state = orchestrator.get(workflow_id).await?.state;
    if json {
        println!(
            "{}",
            serde_json::json!({ "workflow_id": workflow_id, "state": final_state.label() })
        );
    } else {
        println!("workflow {workflow_id} finished in state {final_state}");
    }
    Ok(())
}

fn decision_for(kind: ApprovalKind, args: &RunArgs) -> ApprovalDecision {
    let reject = match kind {
        ApprovalKind::Manufacturing => args.reject_manufacturing,
        ApprovalKind::Markdown => args.reject_markdown,
    };
    if reject {
        ApprovalDecision::Reject
    } else {
        ApprovalDecision::Approve
    }
}

fn print_event(kind: &StatusEventKind) {
    match kind {
        StatusEventKind::AgentStarted { agent } => println!("[{agent}] started"),
        StatusEventKind::AgentProgress { agent, message, progress_pct } => {
            match progress_pct {
                Some(pct) => println!("[{agent}] {message} ({pct:.0}%)"),
                None => println!("[{agent}] {message}"),
            }
        }
        StatusEventKind::AgentCompleted { agent, duration_seconds, .. } => {
            println!("[{agent}] completed in {duration_seconds:.2}s");
        }
        StatusEventKind::HumanInputRequired { approval_kind, .. } => {
            println!("[approval] {approval_kind} decision required");
        }
        StatusEventKind::WorkflowComplete { .. } => println!("[workflow] complete"),
        StatusEventKind::Error { agent, message } => match agent {
            Some(agent) => println!("[{agent}] error: {message}"),
            None => println!("[workflow] {message}"),
        },
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::from_str(s).with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn parse_strategy(s: &str) -> Result<ReplenishmentStrategy> {
    match s {
        "none" => Ok(ReplenishmentStrategy::None),
        "weekly" => Ok(ReplenishmentStrategy::Weekly),
        "biweekly" => Ok(ReplenishmentStrategy::Biweekly),
        other => anyhow::bail!("invalid strategy '{other}', expected none, weekly, or biweekly"),
    }
}
