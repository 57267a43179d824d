//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing domain to external systems:
//! - `gateway` - Payment gateway REST client and test double
//! - `postgres` - PostgreSQL ledger, webhook audit and member directory
//! - `memory` - In-memory storage for tests and local runs
//! - `http` - Axum REST API

pub mod gateway;
pub mod http;
pub mod memory;
pub mod postgres;

pub use gateway::{HttpPaymentGateway, MockPaymentGateway};
pub use memory::{InMemoryLedgerStore, InMemoryMemberDirectory, InMemoryWebhookEventRepository};
pub use postgres::{PostgresLedgerStore, PostgresMemberDirectory, PostgresWebhookEventRepository};
