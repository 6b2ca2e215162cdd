//! Built-in agent implementations behind the `Agent` port.

pub mod demand;
pub mod inventory;
pub mod mock;
pub mod pricing;

pub use demand::DemandAgent;
pub use inventory::InventoryAgent;
pub use mock::{MockAgent, MockBehavior};
pub use pricing::PricingAgent;
