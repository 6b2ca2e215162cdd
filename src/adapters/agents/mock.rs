//! Mock agent for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::parameters::ParameterContext;
use crate::domain::ports::agent::{Agent, AgentError, AgentResult, HandoffContext};

/// Behavior for one mock invocation.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Value returned on success.
    pub output: serde_json::Value,
    /// Fail permanently with this message.
    pub fail: Option<String>,
    /// Fail transiently with this message.
    pub transient: Option<String>,
    /// Sleep before responding, to exercise timeouts and cancellation.
    pub delay: Option<Duration>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            output: serde_json::json!({"mock": true}),
            fail: None,
            transient: None,
            delay: None,
        }
    }
}

impl MockBehavior {
    pub fn success(output: serde_json::Value) -> Self {
        Self { output, ..Default::default() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { fail: Some(message.into()), ..Default::default() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self { transient: Some(message.into()), ..Default::default() }
    }

    pub fn delayed(output: serde_json::Value, delay: Duration) -> Self {
        Self { output, delay: Some(delay), ..Default::default() }
    }
}

/// Agent whose behavior is scripted per invocation.
///
/// Behaviors queue up front-to-back; once the queue drains, the default
/// behavior repeats. Invocation count is observable for retry assertions.
pub struct MockAgent {
    name: &'static str,
    default_behavior: MockBehavior,
    queued: Mutex<VecDeque<MockBehavior>>,
    invocations: AtomicU64,
}

impl MockAgent {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            default_behavior: MockBehavior::default(),
            queued: Mutex::new(VecDeque::new()),
            invocations: AtomicU64::new(0),
        })
    }

    pub fn with_default(name: &'static str, behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            default_behavior: behavior,
            queued: Mutex::new(VecDeque::new()),
            invocations: AtomicU64::new(0),
        })
    }

    /// Queue a one-shot behavior ahead of the default.
    pub fn enqueue(&self, behavior: MockBehavior) {
        self.queued.lock().unwrap().push_back(behavior);
    }

    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> MockBehavior {
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn invoke(
        &self,
        _params: &ParameterContext,
        _handoff: &HandoffContext,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let behavior = self.next_behavior();

        if let Some(delay) = behavior.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            }
        }

        if let Some(message) = behavior.transient {
            return Err(AgentError::Transient(message));
        }
        if let Some(message) = behavior.fail {
            return Err(AgentError::Failed(message));
        }
        Ok(behavior.output)
    }
}
