//! Service layer: the orchestrator and its collaborators.

pub mod approval_gate;
pub mod handoff;
pub mod orchestrator;
pub mod status_publisher;
pub mod variance_monitor;

pub use approval_gate::{ApprovalGate, Resolution};
pub use handoff::HandoffAdapter;
pub use orchestrator::Orchestrator;
pub use status_publisher::{StatusEvent, StatusEventKind, StatusPublisher, Subscription};
pub use variance_monitor::VarianceMonitor;
