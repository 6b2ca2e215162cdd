//! Agent handoff adapter: the only place agent invocations cross into
//! orchestrator land.
//!
//! Enforces a per-agent wall-clock bound and retries transient agent
//! errors with exponential backoff. The orchestrator above never retries;
//! by the time an error surfaces from here it is final for the workflow.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::{AgentsConfig, RetryConfig};
use crate::domain::models::parameters::ParameterContext;
use crate::domain::ports::agent::{Agent, AgentError, HandoffContext};

pub struct HandoffAdapter {
    agents: HashMap<&'static str, Arc<dyn Agent>>,
    timeouts: AgentsConfig,
    retry: RetryConfig,
}

impl HandoffAdapter {
    pub fn new(timeouts: AgentsConfig, retry: RetryConfig) -> Self {
        Self {
            agents: HashMap::new(),
            timeouts,
            retry,
        }
    }

    /// Register an agent under its own name. Last registration wins.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.name(), agent);
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Invoke an agent with timeout and transient-retry handling.
    ///
    /// Timeouts map to `AgentTimeout`, agent-reported failures to
    /// `AgentFailure`; the two are never conflated. Retries apply only to
    /// `Transient` errors and are capped by the retry config.
    pub async fn invoke(
        &self,
        name: &str,
        params: &ParameterContext,
        handoff: &HandoffContext,
        cancel: CancellationToken,
    ) -> DomainResult<serde_json::Value> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| DomainError::AgentNotRegistered(name.to_string()))?;

        let timeout = self.timeouts.timeout_for(name);
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();
        let mut attempts_left = self.retry.max_retries;

        loop {
            let attempt = agent.invoke(params, handoff, cancel.child_token());
            let outcome = tokio::time::timeout(timeout, attempt).await;

            match outcome {
                Err(_) => {
                    warn!(agent = name, timeout_secs = timeout.as_secs(), "agent invocation timed out");
                    return Err(DomainError::AgentTimeout {
                        agent: name.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                Ok(Ok(value)) => {
                    debug!(agent = name, "agent invocation completed");
                    return Ok(value);
                }
                Ok(Err(AgentError::Cancelled)) => {
                    return Err(DomainError::InvocationCancelled(name.to_string()));
                }
                Ok(Err(AgentError::Failed(detail))) => {
                    return Err(DomainError::AgentFailure {
                        agent: name.to_string(),
                        detail,
                    });
                }
                Ok(Err(AgentError::Transient(detail))) => {
                    if attempts_left == 0 {
                        return Err(DomainError::AgentFailure {
                            agent: name.to_string(),
                            detail: format!("transient failure persisted after retries: {detail}"),
                        });
                    }
                    attempts_left -= 1;
                    let pause = backoff.next_backoff().unwrap_or(timeout);
                    debug!(agent = name, %detail, pause_ms = pause.as_millis() as u64, "retrying transient agent error");
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = cancel.cancelled() => {
                            return Err(DomainError::InvocationCancelled(name.to_string()));
                        }
                    }
                }
            }
        }
    }
}
