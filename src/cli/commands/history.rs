//! `merchflow history`: render a workflow's persisted audit trail.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use uuid::Uuid;

use crate::adapters::sqlite::{initialize_database, PoolConfig, SqliteWorkflowStore};
use crate::domain::models::workflow::{HistoryEntry, Workflow};
use crate::domain::ports::store::WorkflowStore;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Workflow id
    pub workflow_id: Uuid,
}

pub async fn execute(args: HistoryArgs, json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::default()
    };
    let pool = initialize_database(&config.database.path, Some(pool_config))
        .await
        .context("failed to open database")?;
    let store = SqliteWorkflowStore::new(pool);

    let workflow = store
        .get(args.workflow_id)
        .await?
        .with_context(|| format!("workflow {} not found", args.workflow_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    println!(
        "workflow {}: state {}, week {}/{}",
        workflow.id, workflow.state, workflow.current_week, workflow.parameters.horizon_weeks
    );
    println!("{}", render_history(&workflow));
    Ok(())
}

fn render_history(workflow: &Workflow) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["At", "Entry", "Detail", "Justification"]);

    for entry in &workflow.history {
        match entry {
            HistoryEntry::Transition(t) => {
                table.add_row(vec![
                    t.at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "transition".to_string(),
                    format!("{} -> {}", t.from, t.to),
                    t.justification.clone().unwrap_or_default(),
                ]);
            }
            HistoryEntry::Invocation(i) => {
                table.add_row(vec![
                    i.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "agent".to_string(),
                    format!("{} ({:?})", i.agent, i.status),
                    i.error.clone().unwrap_or_default(),
                ]);
            }
            HistoryEntry::Variance(v) => {
                table.add_row(vec![
                    v.evaluated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "variance".to_string(),
                    format!(
                        "week {}: {:+.1}%{}",
                        v.week_number,
                        v.variance_pct * 100.0,
                        if v.threshold_exceeded { " (breach)" } else { "" }
                    ),
                    String::new(),
                ]);
            }
            HistoryEntry::Replenishment { week, units, at } => {
                table.add_row(vec![
                    at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "replenishment".to_string(),
                    format!("week {week}: {units:.0} units from DC holdback"),
                    String::new(),
                ]);
            }
            HistoryEntry::ApprovalResolved { approval_id, kind, decision, at } => {
                table.add_row(vec![
                    at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "approval".to_string(),
                    format!("{kind} {decision}"),
                    format!("request {approval_id}"),
                ]);
            }
        }
    }
    table
}
