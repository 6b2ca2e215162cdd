//! Adapter layer: concrete implementations of the domain ports.

pub mod actuals;
pub mod agents;
pub mod sqlite;
