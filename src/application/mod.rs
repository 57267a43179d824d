//! Application layer - Commands, Queries, Handlers and background jobs.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;
pub mod reconciliation;

pub use handlers::billing::*;
pub use reconciliation::{ReconciliationConfig, ReconciliationSweep, SweepReport};
