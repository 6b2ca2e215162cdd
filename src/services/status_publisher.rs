//! Status publisher: per-workflow event fan-out with replay.
//!
//! Every workflow keeps an ordered event log plus a bounded broadcast
//! channel. A new subscriber gets the full log as replay and then the live
//! stream, with the handoff taken under one lock so no event is missed or
//! duplicated at the seam. A slow subscriber that falls behind its buffer
//! drops its oldest events and is flagged as lagged; it never blocks the
//! orchestrator or its peers.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::approval::ApprovalKind;

/// What happened, one of the six published kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEventKind {
    AgentStarted {
        agent: String,
    },
    AgentProgress {
        agent: String,
        message: String,
        progress_pct: Option<f64>,
    },
    AgentCompleted {
        agent: String,
        duration_seconds: f64,
        result: serde_json::Value,
    },
    HumanInputRequired {
        approval_kind: ApprovalKind,
        payload: serde_json::Value,
    },
    WorkflowComplete {
        result: serde_json::Value,
    },
    Error {
        agent: Option<String>,
        message: String,
    },
}

/// One published event, stamped with its workflow and publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub workflow_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StatusEventKind,
}

struct Channel {
    log: Vec<StatusEvent>,
    /// Dropped on close; late subscribers then get replay only.
    sender: Option<broadcast::Sender<StatusEvent>>,
}

pub struct StatusPublisher {
    channels: Mutex<HashMap<Uuid, Channel>>,
    buffer: usize,
}

impl StatusPublisher {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Publish an event for a workflow. Creates the channel on first use.
    pub fn publish(&self, workflow_id: Uuid, kind: StatusEventKind) {
        let event = StatusEvent {
            workflow_id,
            at: Utc::now(),
            kind,
        };

        let mut channels = self.channels.lock().unwrap();
        let channel = channels.entry(workflow_id).or_insert_with(|| Channel {
            log: Vec::new(),
            sender: Some(broadcast::channel(self.buffer).0),
        });
        channel.log.push(event.clone());
        if let Some(sender) = &channel.sender {
            // Send only fails when nobody is subscribed; the log still has it.
            let _ = sender.send(event);
        }
    }

    /// Subscribe to a workflow's stream: full replay, then live events.
    pub fn subscribe(&self, workflow_id: Uuid) -> Subscription {
        let mut channels = self.channels.lock().unwrap();
        let channel = channels.entry(workflow_id).or_insert_with(|| Channel {
            log: Vec::new(),
            sender: Some(broadcast::channel(self.buffer).0),
        });

        // Replay snapshot and live receiver are taken under the same lock,
        // so nothing published in between can be missed or doubled.
        Subscription {
            replay: channel.log.iter().cloned().collect(),
            live: channel.sender.as_ref().map(|s| s.subscribe()),
            lagged: false,
        }
    }

    /// Close a workflow's live stream. The log is kept for replay.
    pub fn close(&self, workflow_id: Uuid) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(channel) = channels.get_mut(&workflow_id) {
            debug!(workflow_id = %workflow_id, events = channel.log.len(), "closing status stream");
            channel.sender = None;
        }
    }
}

/// One subscriber's view of a workflow's event stream.
pub struct Subscription {
    replay: VecDeque<StatusEvent>,
    live: Option<broadcast::Receiver<StatusEvent>>,
    lagged: bool,
}

impl Subscription {
    /// Next event, or `None` once the stream is closed and drained.
    pub async fn next(&mut self) -> Option<StatusEvent> {
        if let Some(event) = self.replay.pop_front() {
            return Some(event);
        }
        let receiver = self.live.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged; oldest events dropped");
                    self.lagged = true;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }

    /// Whether this subscriber ever overflowed its buffer and lost events.
    pub fn lagged(&self) -> bool {
        self.lagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(agent: &str) -> StatusEventKind {
        StatusEventKind::AgentStarted { agent: agent.to_string() }
    }

    #[tokio::test]
    async fn test_replay_then_live_without_gap() {
        let publisher = StatusPublisher::new(16);
        let id = Uuid::new_v4();

        publisher.publish(id, started("demand"));
        publisher.publish(id, started("inventory"));

        let mut sub = publisher.subscribe(id);
        publisher.publish(id, started("pricing"));

        let agents: Vec<String> = [
            sub.next().await.unwrap(),
            sub.next().await.unwrap(),
            sub.next().await.unwrap(),
        ]
        .into_iter()
        .map(|e| match e.kind {
            StatusEventKind::AgentStarted { agent } => agent,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
        assert_eq!(agents, ["demand", "inventory", "pricing"]);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_replay_then_end_of_stream() {
        let publisher = StatusPublisher::new(16);
        let id = Uuid::new_v4();

        publisher.publish(id, started("demand"));
        publisher.publish(
            id,
            StatusEventKind::WorkflowComplete { result: serde_json::json!({}) },
        );
        publisher.close(id);

        let mut sub = publisher.subscribe(id);
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
        assert!(!sub.lagged());
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_and_is_flagged() {
        let publisher = StatusPublisher::new(2);
        let id = Uuid::new_v4();

        let mut sub = publisher.subscribe(id);
        for i in 0..5 {
            publisher.publish(id, started(&format!("agent-{i}")));
        }

        // Buffer of two: only the newest two survive on the live side.
        let first = sub.next().await.unwrap();
        assert!(sub.lagged());
        match first.kind {
            StatusEventKind::AgentStarted { agent } => assert_eq!(agent, "agent-3"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_independent_subscribers() {
        let publisher = StatusPublisher::new(16);
        let id = Uuid::new_v4();

        let mut a = publisher.subscribe(id);
        let mut b = publisher.subscribe(id);
        publisher.publish(id, started("demand"));

        assert!(a.next().await.is_some());
        assert!(b.next().await.is_some());
    }
}
