//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, state machine)
//! - `billing` - Subscriptions, payments, webhook vocabulary and ledger rules

pub mod billing;
pub mod foundation;
