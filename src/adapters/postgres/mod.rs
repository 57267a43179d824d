//! PostgreSQL adapters - Database implementations for the storage ports.
//!
//! - `PostgresLedgerStore` - Customers, subscriptions, payments and ledger lines
//! - `PostgresWebhookEventRepository` - Webhook audit trail and deduplication
//! - `PostgresMemberDirectory` - Read access to member profiles

mod ledger_store;
mod member_directory;
mod webhook_event_repository;

pub use ledger_store::PostgresLedgerStore;
pub use member_directory::PostgresMemberDirectory;
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Maps a sqlx error onto the domain, turning lock waits into conflicts.
fn db_error(operation: &str, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
            tracing::warn!(operation, "Row lock wait exceeded");
            return DomainError::conflict(format!("Failed to {}: lock wait exceeded", operation));
        }
    }
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Failed to {}: {}", operation, err),
    )
}
